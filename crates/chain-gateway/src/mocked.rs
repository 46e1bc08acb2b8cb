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

//! A scriptable in-memory gateway, used by service and handler tests in
//! place of a real chain.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Signature, TxHash, H256, U256};
use ethers::utils::keccak256;
use parking_lot::Mutex;

use sidebet_relayer_utils::{Error, Result};

use crate::{
    ChainGateway, MarketInfo, OnchainParticipant, OnchainProposal,
};

/// One recorded `finalize_market` invocation.
#[derive(Debug, Clone)]
pub struct FinalizeCall {
    /// The finalized market.
    pub market: Address,
    /// Signatures in submission order.
    pub signatures: Vec<Bytes>,
    /// Nonces in submission order.
    pub nonces: Vec<U256>,
    /// Signers in submission order.
    pub signers: Vec<Address>,
}

#[derive(Debug, Default)]
struct MockedState {
    markets: HashMap<Address, MarketInfo>,
    proposals: HashMap<Address, OnchainProposal>,
    participants: HashMap<Address, Vec<OnchainParticipant>>,
    factory_markets: Vec<Address>,
    chain_time: u64,
    finalize_errors: VecDeque<Error>,
    finalize_calls: Vec<FinalizeCall>,
}

/// A gateway whose chain state lives in memory and is scripted by the
/// test. A successful finalize marks the market Resolved, like the real
/// contract would.
#[derive(Debug)]
pub struct MockedChainGateway {
    chain_id: u64,
    relayer: Address,
    state: Mutex<MockedState>,
}

impl MockedChainGateway {
    /// A fresh gateway with no markets and chain time zero.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            relayer: Address::from_low_u64_be(0x7e1a),
            state: Mutex::new(MockedState::default()),
        }
    }

    /// Installs or replaces a market.
    pub fn insert_market(&self, address: Address, info: MarketInfo) {
        self.state.lock().markets.insert(address, info);
    }

    /// Overwrites a market's status.
    pub fn set_market_status(&self, address: Address, status: u8) {
        if let Some(info) = self.state.lock().markets.get_mut(&address) {
            info.status = status;
        }
    }

    /// Installs or replaces a market's proposal.
    pub fn insert_proposal(&self, address: Address, proposal: OnchainProposal) {
        self.state.lock().proposals.insert(address, proposal);
    }

    /// Installs a market's participant list.
    pub fn insert_participants(
        &self,
        address: Address,
        participants: Vec<OnchainParticipant>,
    ) {
        self.state.lock().participants.insert(address, participants);
    }

    /// Sets the factory's market list.
    pub fn set_factory_markets(&self, markets: Vec<Address>) {
        self.state.lock().factory_markets = markets;
    }

    /// Sets the latest block timestamp.
    pub fn set_chain_time(&self, seconds: u64) {
        self.state.lock().chain_time = seconds;
    }

    /// Queues an error for the next `finalize_market` call. Errors are
    /// consumed in order; once drained, finalization succeeds again.
    pub fn fail_next_finalize(&self, error: Error) {
        self.state.lock().finalize_errors.push_back(error);
    }

    /// Every `finalize_market` invocation that went through, in order.
    pub fn finalize_calls(&self) -> Vec<FinalizeCall> {
        self.state.lock().finalize_calls.clone()
    }
}

#[async_trait]
impl ChainGateway for MockedChainGateway {
    async fn market_info(&self, market: Address) -> Result<MarketInfo> {
        self.state
            .lock()
            .markets
            .get(&market)
            .cloned()
            .ok_or_else(|| {
                Error::ContractCall(format!("unknown market {market:?}"))
            })
    }

    async fn proposal(
        &self,
        market: Address,
    ) -> Result<Option<OnchainProposal>> {
        Ok(self.state.lock().proposals.get(&market).cloned())
    }

    async fn participants(
        &self,
        market: Address,
    ) -> Result<Vec<OnchainParticipant>> {
        Ok(self
            .state
            .lock()
            .participants
            .get(&market)
            .cloned()
            .unwrap_or_default())
    }

    async fn all_markets(&self) -> Result<Vec<Address>> {
        Ok(self.state.lock().factory_markets.clone())
    }

    async fn predict_market_address(
        &self,
        topic: &str,
        threshold_percent: u8,
        token: Address,
        min_stake: U256,
        salt: H256,
    ) -> Result<Address> {
        // deterministic, like the factory's CREATE2 derivation.
        let mut preimage = Vec::new();
        preimage.extend_from_slice(topic.as_bytes());
        preimage.push(threshold_percent);
        preimage.extend_from_slice(token.as_bytes());
        let mut stake_bytes = [0u8; 32];
        min_stake.to_big_endian(&mut stake_bytes);
        preimage.extend_from_slice(&stake_bytes);
        preimage.extend_from_slice(salt.as_bytes());
        let hash = keccak256(preimage);
        Ok(Address::from_slice(&hash[12..]))
    }

    async fn verify_attestation(
        &self,
        signature: &Signature,
        claimed_signer: Address,
        market: Address,
        outcome: U256,
        nonce: U256,
    ) -> bool {
        crate::typed_data::verify_attestation_signature(
            signature,
            claimed_signer,
            self.chain_id,
            market,
            outcome,
            nonce,
        )
    }

    async fn finalize_market(
        &self,
        market: Address,
        signatures: Vec<Bytes>,
        nonces: Vec<U256>,
        signers: Vec<Address>,
    ) -> Result<TxHash> {
        let mut state = self.state.lock();
        if let Some(error) = state.finalize_errors.pop_front() {
            return Err(error);
        }
        state.finalize_calls.push(FinalizeCall {
            market,
            signatures: signatures.clone(),
            nonces,
            signers,
        });
        let chain_time = state.chain_time;
        if let Some(info) = state.markets.get_mut(&market) {
            info.status = 2;
            info.resolved_at = Some(chain_time);
        }
        let mut preimage = market.as_bytes().to_vec();
        preimage.extend_from_slice(&(signatures.len() as u64).to_be_bytes());
        Ok(TxHash::from(keccak256(preimage)))
    }

    async fn chain_time(&self) -> Result<u64> {
        Ok(self.state.lock().chain_time)
    }

    fn relayer_address(&self) -> Address {
        self.relayer
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
