// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Sidebet Relayer 🎲
//!
//! The off-chain coordination backend for the Sidebet social-consensus
//! prediction-market protocol.
//!
//! ## Overview
//!
//! Participants stake on binary outcomes; once a result is proposed
//! on-chain, eligible participants produce typed-data attestation
//! signatures agreeing with the proposed outcome. The relayer mirrors
//! on-chain market state into a local store, accepts and deduplicates
//! attestations over HTTP, decides when a market is ready for
//! finalization, and submits the finalization transaction with its hot
//! wallet, retrying until the chain confirms.
//!
//! The process is composed of the HTTP API (a thin layer over the
//! signature, sync and store services) and four background reconcilers
//! (market sync + discovery, dispute-window scan, finalization sweep and
//! stale-proposal scan) fired by the scheduler. All cross-tick state
//! lives in the relational store; the chain is the source of truth for
//! on-chain state and always wins on conflict.

/// A module for starting the HTTP services.
pub mod service;

pub use sidebet_relayer_utils::{Error, Result};
