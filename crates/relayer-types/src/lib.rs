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

#![warn(missing_docs)]

//! # Relayer Types Module 🎲
//!
//! Wrapper types used by the relayer configuration, with `serde`
//! deserializers that understand environment-variable and file
//! indirections for secret values.

/// A Private Key Configuration
pub mod private_key;
/// An RPC URL Configuration
pub mod rpc_url;
