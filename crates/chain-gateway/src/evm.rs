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

//! The `ethers`-backed gateway implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::contract::{abigen, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    Address, BlockNumber, Bytes, Signature, TxHash, H256, U256,
};

use sidebet_relayer_utils::{Error, Result};

use crate::{
    ChainGateway, MarketInfo, OnchainParticipant, OnchainProposal,
};

abigen!(
    SidebetMarket,
    r#"[
        function getMarketInfo() external view returns (string topic, uint256 thresholdPercent, address stakingToken, uint256 participantCount, uint256 totalStaked, uint8 status, uint256 createdAt, uint256 proposedAt, uint256 resolvedAt)
        function getProposal() external view returns (address proposer, uint256 outcome, uint256 disputeUntil, bytes32 evidenceHash, uint256 attestationCount, bool disputed, uint256 proposedAt)
        function getParticipants() external view returns (address[] wallets, uint256[] stakes, uint256[] outcomes, bool[] attested)
        function finalize(bytes[] signatures, uint256[] nonces, address[] signers) external
    ]"#
);

abigen!(
    SidebetFactory,
    r#"[
        function allMarkets() external view returns (address[] markets)
        function predictMarketAddress(string topic, uint256 thresholdPercent, address token, uint256 minStake, bytes32 salt) external view returns (address predicted)
    ]"#
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// The production gateway: an `ethers` HTTP provider for reads and a
/// [`SignerMiddleware`] around the relayer hot wallet for finalization.
#[derive(Debug, Clone)]
pub struct EvmGateway {
    provider: Arc<Provider<Http>>,
    signer: Arc<SignerClient>,
    chain_id: u64,
    factory: Option<Address>,
    read_timeout: Duration,
    finalize_timeout: Duration,
}

impl EvmGateway {
    /// Builds a gateway against the given RPC endpoint. The private key
    /// becomes the hot wallet used only for `finalize_market`.
    pub fn new(
        rpc_url: &url::Url,
        chain_id: u64,
        private_key: H256,
        factory: Option<Address>,
        read_timeout: Duration,
        finalize_timeout: Duration,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())
            .map_err(|e| Error::ChainUnavailable(e.to_string()))?
            .interval(Duration::from_millis(500));
        let wallet = LocalWallet::from_bytes(private_key.as_bytes())?
            .with_chain_id(chain_id);
        let signer =
            Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        let provider = Arc::new(provider);
        Ok(Self {
            provider,
            signer,
            chain_id,
            factory,
            read_timeout,
            finalize_timeout,
        })
    }

    fn market(&self, address: Address) -> SidebetMarket<Provider<Http>> {
        SidebetMarket::new(address, self.provider.clone())
    }

    fn factory_contract(
        &self,
    ) -> Result<SidebetFactory<Provider<Http>>> {
        let factory = self.factory.ok_or_else(|| {
            Error::Validation(
                "no factory address is configured for this relayer".into(),
            )
        })?;
        Ok(SidebetFactory::new(factory, self.provider.clone()))
    }

    /// Runs a contract read under the configured deadline.
    async fn read<T, F>(&self, what: &'static str, call: F) -> Result<T>
    where
        F: std::future::Future<
            Output = std::result::Result<T, ContractError<Provider<Http>>>,
        >,
    {
        tokio::time::timeout(self.read_timeout, call)
            .await
            .map_err(|_| {
                Error::ChainUnavailable(format!("{what} call timed out"))
            })?
            .map_err(classify_contract_error)
    }
}

/// Reverts become `ContractCall` carrying the revert reason; everything
/// else is a transport problem.
fn classify_contract_error<M: Middleware>(e: ContractError<M>) -> Error {
    if let Some(reason) = e.decode_revert::<String>() {
        Error::ContractCall(reason)
    } else if e.is_revert() {
        Error::ContractCall(e.to_string())
    } else {
        Error::ChainUnavailable(e.to_string())
    }
}

fn nonzero(timestamp: U256) -> Option<u64> {
    (!timestamp.is_zero()).then(|| timestamp.as_u64())
}

#[async_trait]
impl ChainGateway for EvmGateway {
    async fn market_info(&self, market: Address) -> Result<MarketInfo> {
        let contract = self.market(market);
        let (
            topic,
            threshold_percent,
            staking_token,
            participant_count,
            total_staked,
            status,
            created_at,
            proposed_at,
            resolved_at,
        ) = self
            .read("getMarketInfo", contract.get_market_info().call())
            .await?;
        Ok(MarketInfo {
            topic,
            threshold_percent: threshold_percent.as_u64() as u8,
            staking_token,
            participant_count: participant_count.as_u64(),
            total_staked,
            status,
            created_at: created_at.as_u64(),
            proposed_at: nonzero(proposed_at),
            resolved_at: nonzero(resolved_at),
        })
    }

    async fn proposal(
        &self,
        market: Address,
    ) -> Result<Option<OnchainProposal>> {
        let contract = self.market(market);
        let (
            proposer,
            outcome,
            dispute_until,
            evidence_hash,
            attestation_count,
            disputed,
            proposed_at,
        ) = self
            .read("getProposal", contract.get_proposal().call())
            .await?;
        // the contract reports an empty proposal slot as a zero
        // attestation count.
        if attestation_count.is_zero() {
            return Ok(None);
        }
        Ok(Some(OnchainProposal {
            proposer,
            outcome: outcome.as_u64() as u8,
            dispute_until: dispute_until.as_u64(),
            evidence_hash: H256(evidence_hash),
            attestation_count: attestation_count.as_u64(),
            is_disputed: disputed,
            created_at: proposed_at.as_u64(),
        }))
    }

    async fn participants(
        &self,
        market: Address,
    ) -> Result<Vec<OnchainParticipant>> {
        let contract = self.market(market);
        let (wallets, stakes, outcomes, attested) = self
            .read("getParticipants", contract.get_participants().call())
            .await?;
        let participants = wallets
            .into_iter()
            .zip(stakes)
            .zip(outcomes)
            .zip(attested)
            .map(|(((wallet, stake), outcome), has_attested)| {
                OnchainParticipant {
                    wallet,
                    stake,
                    outcome: outcome.as_u64() as u8,
                    has_attested,
                }
            })
            .collect();
        Ok(participants)
    }

    async fn all_markets(&self) -> Result<Vec<Address>> {
        if self.factory.is_none() {
            return Ok(Vec::new());
        }
        let factory = self.factory_contract()?;
        self.read("allMarkets", factory.all_markets().call()).await
    }

    async fn predict_market_address(
        &self,
        topic: &str,
        threshold_percent: u8,
        token: Address,
        min_stake: U256,
        salt: H256,
    ) -> Result<Address> {
        let factory = self.factory_contract()?;
        self.read(
            "predictMarketAddress",
            factory
                .predict_market_address(
                    topic.to_string(),
                    U256::from(threshold_percent),
                    token,
                    min_stake,
                    salt.0,
                )
                .call(),
        )
        .await
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
        let contract = SidebetMarket::new(market, self.signer.clone());
        let call = contract.finalize(signatures, nonces, signers);
        let pending =
            call.send().await.map_err(classify_contract_error)?;
        let tx_hash: TxHash = *pending;
        tracing::debug!(?tx_hash, %market, "finalize transaction submitted");
        let receipt =
            tokio::time::timeout(self.finalize_timeout, pending.confirmations(1))
                .await
                .map_err(|_| {
                    Error::ChainUnavailable(
                        "finalize confirmation timed out".into(),
                    )
                })?
                .map_err(|e| Error::ChainUnavailable(e.to_string()))?
                .ok_or_else(|| {
                    Error::ContractCall(
                        "finalize transaction dropped from the mempool".into(),
                    )
                })?;
        Ok(receipt.transaction_hash)
    }

    async fn chain_time(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| Error::ChainUnavailable(e.to_string()))?
            .ok_or_else(|| {
                Error::ChainUnavailable("no latest block available".into())
            })?;
        Ok(block.timestamp.as_u64())
    }

    fn relayer_address(&self) -> Address {
        self.signer.signer().address()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
