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

//! Chain-to-store reconciliation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use ethers::types::Address;

use sidebet_chain_gateway::{ChainGateway, MarketInfo};
use sidebet_relayer_store::models::{Market, MarketRecord};
use sidebet_relayer_store::SqliteStore;
use sidebet_relayer_utils::{Error, Result};

use crate::address_string;

/// Mirrors authoritative chain state into the store. The chain always
/// wins: conflicts between the store and the chain are resolved by
/// overwriting the store.
#[derive(Clone)]
pub struct SyncService {
    store: SqliteStore,
    gateway: Arc<dyn ChainGateway>,
}

impl SyncService {
    /// Creates a sync service over the given store and gateway.
    pub fn new(store: SqliteStore, gateway: Arc<dyn ChainGateway>) -> Self {
        Self { store, gateway }
    }

    /// Reconciles one market: market info, proposal and participants are
    /// fetched concurrently, and whatever succeeded is written even when
    /// another subcall failed. A fully successful pass stamps the
    /// market's last-sync time (through the upsert) and records a
    /// success log entry.
    pub async fn sync_market(&self, market: Address) -> Result<Market> {
        let address = address_string(market);
        let (info, proposal, participants) = tokio::join!(
            self.gateway.market_info(market),
            self.gateway.proposal(market),
            self.gateway.participants(market),
        );

        let mut failures: Vec<(&'static str, Error)> = Vec::new();

        match info {
            Ok(info) => {
                self.store
                    .upsert_market(market_record(&address, &info))
                    .await?;
            }
            Err(e) => failures.push(("getMarketInfo", e)),
        }

        match participants {
            Ok(list) => {
                for p in &list {
                    self.store
                        .upsert_participant(
                            &address,
                            &address_string(p.wallet),
                            &p.stake.to_string(),
                            p.outcome as i64,
                            p.has_attested,
                        )
                        .await?;
                }
            }
            Err(e) => failures.push(("getParticipants", e)),
        }

        match proposal {
            Ok(Some(p)) => {
                if p.is_disputed {
                    self.store.mark_proposal_disputed(&address).await?;
                } else if self
                    .store
                    .active_proposal(&address)
                    .await?
                    .is_none()
                {
                    self.store
                        .create_proposal(
                            &address,
                            &address_string(p.proposer),
                            p.outcome as i64,
                            p.dispute_until as i64,
                            &format!("{:?}", p.evidence_hash),
                            p.created_at as i64,
                        )
                        .await?;
                }
            }
            Ok(None) => {}
            Err(e) => failures.push(("getProposal", e)),
        }

        if failures.is_empty() {
            self.store
                .log_sync_operation("sync", Some(&address), "success", None)
                .await?;
            self.store.market(&address).await?.ok_or_else(|| {
                Error::NotFound(format!("market {address} is not known"))
            })
        } else {
            let names =
                failures.iter().map(|(n, _)| *n).collect::<Vec<_>>();
            let message = format!("failed subcalls: {}", names.join(", "));
            tracing::error!(market = %address, %message, "market sync failed");
            self.store
                .log_sync_operation(
                    "sync",
                    Some(&address),
                    "error",
                    Some(&message),
                )
                .await?;
            Err(failures.remove(0).1)
        }
    }

    /// Re-syncs every market whose last sync is older than
    /// `stale_after_secs`. Per-market failures are isolated; one market
    /// failing never aborts the sweep.
    pub async fn sync_stale(&self, stale_after_secs: u64) -> Result<usize> {
        let cutoff =
            Utc::now() - Duration::seconds(stale_after_secs as i64);
        let stale = self.store.stale_markets(cutoff).await?;
        let mut synced = 0usize;
        for address in stale {
            match address.parse::<Address>() {
                Ok(market) => {
                    if self.sync_market(market).await.is_ok() {
                        synced += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(%address, ?e, "stored market address is unparseable");
                }
            }
        }
        Ok(synced)
    }

    /// Fetches the factory market list and syncs every address the store
    /// has not seen yet. Returns the number of newly discovered markets.
    pub async fn discover_new_markets(&self) -> Result<usize> {
        let onchain = self.gateway.all_markets().await?;
        if onchain.is_empty() {
            return Ok(0);
        }
        let known: HashSet<String> =
            self.store.market_addresses().await?.into_iter().collect();
        let mut discovered = 0usize;
        for market in onchain {
            if known.contains(&address_string(market)) {
                continue;
            }
            match self.sync_market(market).await {
                Ok(_) => discovered += 1,
                Err(e) => {
                    tracing::error!(market = %address_string(market), ?e, "failed to sync discovered market");
                }
            }
        }
        if discovered > 0 {
            tracing::info!(discovered, "synced newly discovered markets");
        }
        Ok(discovered)
    }
}

fn market_record(address: &str, info: &MarketInfo) -> MarketRecord {
    MarketRecord {
        address: address.to_string(),
        topic: info.topic.clone(),
        threshold_percent: info.threshold_percent as i64,
        staking_token: address_string(info.staking_token),
        participant_count: info.participant_count as i64,
        total_staked: info.total_staked.to_string(),
        status: info.status as i64,
        created_at: Some(info.created_at as i64),
        proposed_at: info.proposed_at.map(|t| t as i64),
        resolved_at: info.resolved_at.map(|t| t as i64),
    }
}
