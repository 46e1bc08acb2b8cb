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

//! The authoritative ingestion path for attestations.

use std::sync::Arc;

use ethers::types::{Address, Signature, U256};
use serde::Serialize;

use sidebet_chain_gateway::ChainGateway;
use sidebet_relayer_store::models::{Attestation, FinalizationBundle};
use sidebet_relayer_store::SqliteStore;
use sidebet_relayer_utils::{Error, Result};

use crate::sync::SyncService;
use crate::{address_string, required_signatures};

/// One attestation as submitted by a wallet.
#[derive(Debug, Clone)]
pub struct AttestationSubmission {
    /// The market being attested.
    pub market: Address,
    /// The attesting wallet.
    pub signer: Address,
    /// Attested outcome, 0 or 1.
    pub outcome: u8,
    /// Attestation nonce.
    pub nonce: U256,
    /// The typed-data signature.
    pub signature: Signature,
}

/// The result of a successful ingest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// The stored attestation row.
    pub attestation: Attestation,
    /// Valid attestations for the active proposal's outcome, after this
    /// insert.
    pub signature_count: i64,
    /// Participants eligible for the active proposal's outcome.
    pub eligible_count: i64,
    /// Signatures required before the market is queued.
    pub required_signatures: i64,
    /// Whether this ingest pushed the market into the finalization queue.
    pub enqueued: bool,
}

/// Validates, authorizes and stores attestations, recomputes thresholds,
/// and enqueues finalization candidates.
#[derive(Clone)]
pub struct SignatureService {
    store: SqliteStore,
    gateway: Arc<dyn ChainGateway>,
    sync: SyncService,
    min_signatures_threshold: u64,
}

impl SignatureService {
    /// Creates a signature service.
    pub fn new(
        store: SqliteStore,
        gateway: Arc<dyn ChainGateway>,
        min_signatures_threshold: u64,
    ) -> Self {
        let sync = SyncService::new(store.clone(), gateway.clone());
        Self {
            store,
            gateway,
            sync,
            min_signatures_threshold,
        }
    }

    /// Ingests one attestation.
    ///
    /// The signature is verified first, then the signer is authorized
    /// against the market's participants and the active proposal, the
    /// row is persisted under the (market, signer, nonce) uniqueness
    /// constraint, and finally the cached counts are recomputed from the
    /// store so racing inserts converge.
    pub async fn submit(
        &self,
        submission: AttestationSubmission,
    ) -> Result<IngestOutcome> {
        let AttestationSubmission {
            market,
            signer,
            outcome,
            nonce,
            signature,
        } = submission;
        let market_address = address_string(market);
        let signer_address = address_string(signer);

        // 1. the signature must recover to the claimed signer.
        let ok = self
            .gateway
            .verify_attestation(
                &signature,
                signer,
                market,
                U256::from(outcome),
                nonce,
            )
            .await;
        if !ok {
            return Err(Error::SignatureInvalid);
        }

        // 2. an unknown market gets one synchronous sync before we give
        // up on it.
        let market_row = match self.store.market(&market_address).await? {
            Some(row) => row,
            None => {
                if let Err(e) = self.sync.sync_market(market).await {
                    tracing::debug!(market = %market_address, ?e, "one-shot sync for unknown market failed");
                }
                self.store.market(&market_address).await?.ok_or_else(
                    || {
                        Error::NotFound(format!(
                            "market {market_address} is not known"
                        ))
                    },
                )?
            }
        };

        // 3. the signer must hold a stake in this market.
        let participant = self
            .store
            .participant(&market_address, &signer_address)
            .await?
            .ok_or_else(|| Error::NotParticipant {
                market: market_address.clone(),
                signer: signer_address.clone(),
            })?;

        // 4. and must attest the outcome they staked on.
        if participant.outcome != outcome as i64 {
            return Err(Error::OutcomeMismatch {
                submitted: outcome,
                expected: participant.outcome as u8,
            });
        }

        // 5. which must also be the active proposal's outcome.
        let proposal = self
            .store
            .active_proposal(&market_address)
            .await?
            .ok_or_else(|| {
                Error::NoActiveProposal(market_address.clone())
            })?;
        if proposal.outcome != outcome as i64 {
            return Err(Error::OutcomeMismatch {
                submitted: outcome,
                expected: proposal.outcome as u8,
            });
        }

        // 6. persist; a prior valid (market, signer, nonce) row is a
        // conflict.
        let attestation = self
            .store
            .create_attestation(
                &market_address,
                &signer_address,
                outcome as i64,
                &nonce.to_string(),
                &format!("0x{signature}"),
                proposal.id,
            )
            .await?;

        // 7. recompute the count from the store and refresh the cached
        // aggregate.
        let signature_count = self
            .store
            .count_valid_attestations(&market_address, proposal.outcome)
            .await?;
        self.store
            .set_proposal_attestation_count(proposal.id, signature_count)
            .await?;

        // 8. threshold check; crossing it queues the market.
        let eligible_count = self
            .store
            .count_eligible_participants(&market_address, proposal.outcome)
            .await?;
        let required = required_signatures(
            eligible_count as u64,
            market_row.threshold_percent as u64,
            self.min_signatures_threshold,
        ) as i64;
        let enqueued = signature_count >= required;
        if enqueued {
            self.store.enqueue_finalization(&market_address).await?;
            tracing::info!(
                market = %market_address,
                signature_count,
                required,
                "attestation threshold reached, market queued for finalization"
            );
        }

        Ok(IngestOutcome {
            attestation,
            signature_count,
            eligible_count,
            required_signatures: required,
            enqueued,
        })
    }

    /// Valid attestations of a market in submission order, optionally
    /// filtered by outcome.
    pub async fn attestations(
        &self,
        market: Address,
        outcome: Option<u8>,
    ) -> Result<Vec<Attestation>> {
        self.store
            .attestations(&address_string(market), outcome.map(|o| o as i64))
            .await
    }

    /// The signature bundle for the on-chain finalize call.
    pub async fn attestations_for_finalization(
        &self,
        market: Address,
        outcome: u8,
    ) -> Result<FinalizationBundle> {
        self.store
            .attestations_for_finalization(
                &address_string(market),
                outcome as i64,
            )
            .await
    }

    /// The gateway this service verifies signatures with.
    pub fn gateway(&self) -> Arc<dyn ChainGateway> {
        self.gateway.clone()
    }
}
