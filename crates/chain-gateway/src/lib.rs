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

//! # Chain Gateway Module 🎲
//!
//! The single point of contact with the chain.
//!
//! ## Overview
//!
//! The gateway wraps the chain RPC behind a typed, async trait: reading
//! market/proposal/participant state, verifying attestation typed-data
//! signatures, and submitting finalization transactions with the relayer
//! hot wallet. It carries no business logic; errors are translated into
//! the relayer taxonomy at this boundary (`ChainUnavailable` for
//! transport and timeouts, `ContractCall` for reverts).

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Signature, TxHash, H256, U256};

use sidebet_relayer_utils::Result;

/// EVM implementation of the gateway, backed by `ethers`.
pub mod evm;
/// A scriptable in-memory gateway for tests.
pub mod mocked;
/// The attestation typed-data domain and digest.
pub mod typed_data;

pub use evm::EvmGateway;
pub use mocked::MockedChainGateway;

/// A market's on-chain view, as reported by the market contract.
#[derive(Debug, Clone)]
pub struct MarketInfo {
    /// Short free text describing the bet.
    pub topic: String,
    /// Per-market attestation threshold, percent (51..=99).
    pub threshold_percent: u8,
    /// The staking token address.
    pub staking_token: Address,
    /// Number of participants.
    pub participant_count: u64,
    /// Total staked amount.
    pub total_staked: U256,
    /// Numeric market status (0=Open .. 4=Cancelled).
    pub status: u8,
    /// Chain time of creation, seconds.
    pub created_at: u64,
    /// Chain time of the proposal, seconds. Zero on chain means absent.
    pub proposed_at: Option<u64>,
    /// Chain time of resolution, seconds. Zero on chain means absent.
    pub resolved_at: Option<u64>,
}

/// A proposal's on-chain view.
#[derive(Debug, Clone)]
pub struct OnchainProposal {
    /// The proposer wallet.
    pub proposer: Address,
    /// Proposed outcome, 0 or 1.
    pub outcome: u8,
    /// Chain time until which the proposal can be disputed, seconds.
    pub dispute_until: u64,
    /// Opaque evidence reference.
    pub evidence_hash: H256,
    /// Number of attestations the contract has counted.
    pub attestation_count: u64,
    /// Whether the proposal was challenged.
    pub is_disputed: bool,
    /// Chain time of the proposal, seconds.
    pub created_at: u64,
}

/// A participant's on-chain view.
#[derive(Debug, Clone)]
pub struct OnchainParticipant {
    /// The participant wallet.
    pub wallet: Address,
    /// Staked amount.
    pub stake: U256,
    /// Chosen outcome, 0 or 1.
    pub outcome: u8,
    /// Whether the chain has seen an attestation from this wallet.
    pub has_attested: bool,
}

/// The single point of contact with the chain.
///
/// Implementations are stateless apart from their connection and the
/// relayer hot wallet, which is used only by [`finalize_market`].
///
/// [`finalize_market`]: ChainGateway::finalize_market
#[async_trait]
pub trait ChainGateway: Send + Sync + 'static {
    /// Reads the market's on-chain view.
    async fn market_info(&self, market: Address) -> Result<MarketInfo>;

    /// Reads the market's proposal. `None` iff the contract reports an
    /// attestation count of zero.
    async fn proposal(&self, market: Address)
        -> Result<Option<OnchainProposal>>;

    /// Reads all participants of a market.
    async fn participants(
        &self,
        market: Address,
    ) -> Result<Vec<OnchainParticipant>>;

    /// All market addresses known to the factory. Empty when no factory
    /// is configured.
    async fn all_markets(&self) -> Result<Vec<Address>>;

    /// Deterministic CREATE2-style address derivation, delegated to the
    /// factory.
    async fn predict_market_address(
        &self,
        topic: &str,
        threshold_percent: u8,
        token: Address,
        min_stake: U256,
        salt: H256,
    ) -> Result<Address>;

    /// Verifies that `signature` recovers to `claimed_signer` under the
    /// market's attestation typed-data domain. Any failure is `false`.
    async fn verify_attestation(
        &self,
        signature: &Signature,
        claimed_signer: Address,
        market: Address,
        outcome: U256,
        nonce: U256,
    ) -> bool;

    /// Submits the finalization transaction and awaits one confirmation.
    async fn finalize_market(
        &self,
        market: Address,
        signatures: Vec<Bytes>,
        nonces: Vec<U256>,
        signers: Vec<Address>,
    ) -> Result<TxHash>;

    /// The latest block timestamp, in seconds. Dispute windows are
    /// measured against chain time, not wall time.
    async fn chain_time(&self) -> Result<u64>;

    /// The relayer hot wallet address.
    fn relayer_address(&self) -> Address;

    /// The chain id this gateway talks to.
    fn chain_id(&self) -> u64;
}
