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

//! Finalization readiness and submission.
//!
//! Drives markets from Proposed (with enough attestations and an expired
//! dispute window) to Resolved on-chain. Failures never propagate to the
//! scheduler; they are recorded on the queue entry and in the sync log,
//! and the entry stays pending for the next sweep.

use std::sync::Arc;

use ethers::types::{Address, Bytes, U256};
use serde::Serialize;

use sidebet_chain_gateway::ChainGateway;
use sidebet_relayer_store::models::{FinalizationEntry, MarketStatus};
use sidebet_relayer_store::SqliteStore;
use sidebet_relayer_utils::{Error, Result};

use crate::sync::SyncService;
use crate::required_signatures;

/// How many queue entries one sweep processes.
const SWEEP_BATCH: i64 = 50;

/// The outcome of a readiness check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    /// Whether every readiness predicate holds.
    pub ready: bool,
    /// The first failed predicate, when not ready.
    pub reason: Option<String>,
    /// Valid attestations for the proposal outcome.
    pub signature_count: i64,
    /// Signatures required, including the global minimum.
    pub required_signatures: i64,
    /// Participants eligible for the proposal outcome.
    pub eligible_count: i64,
}

impl Readiness {
    fn not_ready(reason: &str) -> Self {
        Self {
            ready: false,
            reason: Some(reason.to_string()),
            signature_count: 0,
            required_signatures: 0,
            eligible_count: 0,
        }
    }
}

/// Scans the finalization queue and submits ready markets on-chain.
#[derive(Clone)]
pub struct FinalizationService {
    store: SqliteStore,
    gateway: Arc<dyn ChainGateway>,
    sync: SyncService,
    min_signatures_threshold: u64,
    max_proposal_age_secs: u64,
}

impl FinalizationService {
    /// Creates a finalization service.
    pub fn new(
        store: SqliteStore,
        gateway: Arc<dyn ChainGateway>,
        min_signatures_threshold: u64,
        max_proposal_age_secs: u64,
    ) -> Self {
        let sync = SyncService::new(store.clone(), gateway.clone());
        Self {
            store,
            gateway,
            sync,
            min_signatures_threshold,
            max_proposal_age_secs,
        }
    }

    /// Evaluates the readiness predicates for one market:
    /// the market exists and is not terminal, an active proposal exists,
    /// the dispute window has expired on chain time, and the valid
    /// attestation count reaches `max(required, global minimum)`.
    pub async fn is_ready(&self, market: &str) -> Result<Readiness> {
        let Some(market_row) = self.store.market(market).await? else {
            return Ok(Readiness::not_ready("market is not known"));
        };
        let finalizable = market_row
            .market_status()
            .map(|s| s.is_finalizable())
            .unwrap_or(false);
        if !finalizable {
            return Ok(Readiness::not_ready("market is already terminal"));
        }
        let Some(proposal) = self.store.active_proposal(market).await?
        else {
            return Ok(Readiness::not_ready("no active proposal"));
        };
        let now = self.gateway.chain_time().await?;
        // chain time, not wall time, and only once `now >= dispute_until`.
        if (now as i64) < proposal.dispute_until {
            return Ok(Readiness::not_ready("dispute window still open"));
        }
        let signature_count = self
            .store
            .count_valid_attestations(market, proposal.outcome)
            .await?;
        let eligible_count = self
            .store
            .count_eligible_participants(market, proposal.outcome)
            .await?;
        let required = required_signatures(
            eligible_count as u64,
            market_row.threshold_percent as u64,
            self.min_signatures_threshold,
        ) as i64;
        let ready = signature_count >= required;
        Ok(Readiness {
            ready,
            reason: (!ready)
                .then(|| "not enough attestations".to_string()),
            signature_count,
            required_signatures: required,
            eligible_count,
        })
    }

    /// One pass over the pending queue. Per-entry failures are recorded
    /// and swallowed; the sweep itself only fails on store errors.
    pub async fn process_queue(&self) -> Result<usize> {
        let entries =
            self.store.pending_finalizations(SWEEP_BATCH).await?;
        let mut finalized = 0usize;
        for entry in entries {
            match self.process_entry(&entry).await {
                Ok(true) => finalized += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        market = %entry.market_address,
                        ?e,
                        "finalization check failed"
                    );
                    self.store
                        .touch_finalization(&entry.market_address)
                        .await
                        .ok();
                }
            }
        }
        Ok(finalized)
    }

    /// Processes one queue entry. Returns `true` when the entry reached
    /// its terminal completed state during this pass.
    async fn process_entry(
        &self,
        entry: &FinalizationEntry,
    ) -> Result<bool> {
        let address = entry.market_address.as_str();
        let market: Address = address.parse().map_err(|_| {
            Error::Validation(format!("invalid market address {address}"))
        })?;

        // re-read the chain first: finalize is not idempotent on-chain,
        // so an already-resolved market short-circuits to completed.
        let info = self.gateway.market_info(market).await?;
        if info.status == MarketStatus::Resolved.as_i64() as u8 {
            self.store.mark_finalization_completed(address).await?;
            self.store
                .log_sync_operation(
                    "finalize",
                    Some(address),
                    "success",
                    Some("already resolved on-chain"),
                )
                .await?;
            self.mirror(market).await;
            return Ok(true);
        }

        let readiness = self.is_ready(address).await?;
        if !readiness.ready {
            tracing::trace!(
                market = %address,
                reason = readiness.reason.as_deref().unwrap_or(""),
                "market not ready, leaving queued"
            );
            // refresh the cached counts and the last-checked stamp.
            self.store.enqueue_finalization(address).await?;
            return Ok(false);
        }

        let Some(proposal) = self.store.active_proposal(address).await?
        else {
            self.store.touch_finalization(address).await?;
            return Ok(false);
        };
        let bundle = self
            .store
            .attestations_for_finalization(address, proposal.outcome)
            .await?;
        if bundle.is_empty() {
            tracing::warn!(
                market = %address,
                "ready market has no stored attestations to submit"
            );
            self.store.touch_finalization(address).await?;
            return Ok(false);
        }

        let mut signatures = Vec::with_capacity(bundle.len());
        let mut nonces = Vec::with_capacity(bundle.len());
        let mut signers = Vec::with_capacity(bundle.len());
        for ((signature, nonce), signer) in bundle
            .signatures
            .iter()
            .zip(&bundle.nonces)
            .zip(&bundle.signers)
        {
            signatures.push(signature.parse::<Bytes>().map_err(|e| {
                Error::Validation(format!("stored signature is invalid: {e}"))
            })?);
            nonces.push(U256::from_dec_str(nonce).map_err(|e| {
                Error::Validation(format!("stored nonce is invalid: {e}"))
            })?);
            signers.push(signer.parse::<Address>().map_err(|_| {
                Error::Validation(format!("stored signer {signer} is invalid"))
            })?);
        }

        match self
            .gateway
            .finalize_market(market, signatures, nonces, signers)
            .await
        {
            Ok(tx_hash) => {
                tracing::info!(
                    market = %address,
                    ?tx_hash,
                    attestations = bundle.len(),
                    "market finalized"
                );
                self.store.mark_finalization_completed(address).await?;
                self.store
                    .log_sync_operation(
                        "finalize",
                        Some(address),
                        "success",
                        Some(&format!("tx {tx_hash:?}")),
                    )
                    .await?;
                self.mirror(market).await;
                Ok(true)
            }
            Err(e) => {
                tracing::error!(market = %address, ?e, "finalize submission failed");
                self.store
                    .mark_finalization_attempted(address, &e.to_string())
                    .await?;
                self.store
                    .log_sync_operation(
                        "finalize",
                        Some(address),
                        "error",
                        Some(&e.to_string()),
                    )
                    .await?;
                Ok(false)
            }
        }
    }

    /// Enqueues every market whose active proposal's dispute window has
    /// expired. Returns the number of enqueued markets.
    pub async fn check_dispute_windows(&self) -> Result<usize> {
        let now = self.gateway.chain_time().await?;
        let expired = self
            .store
            .proposals_with_expired_windows(now as i64)
            .await?;
        let mut enqueued = 0usize;
        for proposal in expired {
            self.store
                .enqueue_finalization(&proposal.market_address)
                .await?;
            enqueued += 1;
            tracing::debug!(
                market = %proposal.market_address,
                dispute_until = proposal.dispute_until,
                "dispute window expired, market queued"
            );
        }
        Ok(enqueued)
    }

    /// Safety net for aged proposals: anything older than the configured
    /// maximum age that has reached the global minimum is enqueued;
    /// undercollected ones are logged as warnings and left alone.
    pub async fn check_old_proposals(&self) -> Result<usize> {
        let now = self.gateway.chain_time().await?;
        let cutoff = now as i64 - self.max_proposal_age_secs as i64;
        let aged = self.store.aged_active_proposals(cutoff).await?;
        let mut enqueued = 0usize;
        for proposal in aged {
            let count = self
                .store
                .count_valid_attestations(
                    &proposal.market_address,
                    proposal.outcome,
                )
                .await?;
            if count as u64 >= self.min_signatures_threshold {
                self.store
                    .enqueue_finalization(&proposal.market_address)
                    .await?;
                self.store
                    .log_sync_operation(
                        "stale-proposal",
                        Some(&proposal.market_address),
                        "warning",
                        Some("aged proposal queued for finalization"),
                    )
                    .await?;
                enqueued += 1;
            } else {
                tracing::warn!(
                    market = %proposal.market_address,
                    attestations = count,
                    minimum = self.min_signatures_threshold,
                    "aged proposal is below the global minimum, not queueing"
                );
                self.store
                    .log_sync_operation(
                        "stale-proposal",
                        Some(&proposal.market_address),
                        "warning",
                        Some(&format!(
                            "aged proposal has {count} attestations, below the global minimum of {}",
                            self.min_signatures_threshold
                        )),
                    )
                    .await?;
            }
        }
        Ok(enqueued)
    }

    /// Mirrors resolved state back into the store after a finalize; a
    /// failed mirror is retried by the next sync sweep.
    async fn mirror(&self, market: Address) {
        if let Err(e) = self.sync.sync_market(market).await {
            tracing::debug!(?e, "post-finalize sync failed, the next sweep will pick it up");
        }
    }
}
