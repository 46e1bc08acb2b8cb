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

//! The scheduler that fires the periodic reconcilers.
//!
//! Every job is a spawned task looping over a [`tokio::time::interval`]
//! with skipped missed ticks; the tick body is awaited in place, so a
//! tick that is still running suppresses the next one instead of
//! queueing it. All jobs race against the context's shutdown signal.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use sidebet_relayer_context::RelayerContext;
use sidebet_relayer_utils::Result;

use crate::{FinalizationService, SignatureService, SyncService};

/// The service handles the scheduler drives. Handlers share the same
/// instances so the HTTP layer and the reconcilers observe one store.
#[derive(Clone)]
pub struct Services {
    /// Attestation ingestion.
    pub signature: SignatureService,
    /// Chain-to-store reconciliation.
    pub sync: SyncService,
    /// Finalization readiness and submission.
    pub finalization: FinalizationService,
}

impl Services {
    /// Builds the service set from the context's store and gateway.
    pub fn new(ctx: &RelayerContext) -> Self {
        let store = ctx.store().clone();
        let gateway = ctx.gateway();
        Self {
            signature: SignatureService::new(
                store.clone(),
                gateway.clone(),
                ctx.config.min_signatures_threshold,
            ),
            sync: SyncService::new(store.clone(), gateway.clone()),
            finalization: FinalizationService::new(
                store,
                gateway,
                ctx.config.min_signatures_threshold,
                ctx.config.max_proposal_age_hours * 3600,
            ),
        }
    }
}

/// Starts all background reconcilers. Does not block; the jobs are fired
/// on background tasks and stop when the context signals shutdown.
pub async fn ignite(ctx: &RelayerContext) -> Result<Services> {
    let services = Services::new(ctx);
    let cadence = ctx.config.scheduler;

    // market sync + discovery
    let sync = services.sync.clone();
    let stale_after = cadence.market_stale_after_secs;
    spawn_job(
        ctx,
        "market-sync",
        Duration::from_secs(cadence.sync_interval_secs),
        move || {
            let sync = sync.clone();
            async move {
                let discovered = sync.discover_new_markets().await?;
                let synced = sync.sync_stale(stale_after).await?;
                tracing::debug!(discovered, synced, "market sync tick done");
                Ok(())
            }
        },
    );

    // dispute-window sweep
    let finalization = services.finalization.clone();
    spawn_job(
        ctx,
        "dispute-scan",
        Duration::from_secs(cadence.dispute_scan_interval_secs),
        move || {
            let finalization = finalization.clone();
            async move {
                let enqueued = finalization.check_dispute_windows().await?;
                if enqueued > 0 {
                    tracing::debug!(enqueued, "dispute windows expired");
                }
                Ok(())
            }
        },
    );

    // finalization sweep
    let finalization = services.finalization.clone();
    spawn_job(
        ctx,
        "finalize-sweep",
        Duration::from_secs(cadence.finalize_sweep_interval_secs),
        move || {
            let finalization = finalization.clone();
            async move {
                finalization.process_queue().await?;
                Ok(())
            }
        },
    );

    // stale-proposal sweep
    let finalization = services.finalization.clone();
    spawn_job(
        ctx,
        "stale-proposal-scan",
        Duration::from_secs(cadence.stale_proposal_scan_interval_secs),
        move || {
            let finalization = finalization.clone();
            async move {
                finalization.check_old_proposals().await?;
                Ok(())
            }
        },
    );

    // sync-log cleanup
    let store = ctx.store().clone();
    let retention_days = cadence.log_retention_days;
    spawn_job(
        ctx,
        "log-cleanup",
        Duration::from_secs(cadence.log_cleanup_interval_secs),
        move || {
            let store = store.clone();
            async move {
                let cutoff = Utc::now()
                    - chrono::Duration::days(retention_days as i64);
                let removed = store.prune_sync_logs(cutoff).await?;
                if removed > 0 {
                    tracing::debug!(removed, "pruned old sync log entries");
                }
                Ok(())
            }
        },
    );

    Ok(services)
}

/// Spawns one single-instance periodic job, raced against shutdown.
fn spawn_job<F, Fut>(
    ctx: &RelayerContext,
    name: &'static str,
    period: Duration,
    mut job: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    let mut shutdown = ctx.shutdown_signal();
    let task = async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = job().await {
                tracing::error!(job = name, ?e, "job tick failed");
            }
        }
    };
    tokio::task::spawn(async move {
        tracing::debug!(job = name, "job started");
        tokio::select! {
            _ = task => {},
            _ = shutdown.recv() => {
                tracing::debug!(job = name, "job stopped");
            },
        }
    });
}
