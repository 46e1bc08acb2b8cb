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

//! Health and observability endpoints. Never rate-limited.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use sidebet_chain_gateway::ChainGateway;
use sidebet_relayer_store::models::{
    FinalizationEntry, MarketStatus, StoreCounts, SyncLogEntry,
};

use crate::error::ApiResult;
use crate::routes::{ok, ApiResponse};
use crate::SharedState;

/// `GET /health`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    timestamp: DateTime<Utc>,
    uptime: u64,
}

/// Basic liveness probe.
pub async fn health(
    State(state): State<SharedState>,
) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime: state.ctx.uptime_secs(),
    })
}

/// `GET /health/detailed`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    status: String,
    timestamp: DateTime<Utc>,
    uptime: u64,
    database: StoreCounts,
    chain: ChainHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainHealth {
    connected: bool,
    chain_id: u64,
    relayer_address: String,
    latest_block_time: Option<u64>,
}

/// Liveness plus database counts and live chain connectivity.
pub async fn detailed(
    State(state): State<SharedState>,
) -> ApiResult<Json<ApiResponse<DetailedHealthResponse>>> {
    let database = state.ctx.store().counts().await?;
    let gateway = state.ctx.gateway();
    let latest_block_time = gateway.chain_time().await.ok();
    let chain = ChainHealth {
        connected: latest_block_time.is_some(),
        chain_id: gateway.chain_id(),
        relayer_address: format!("{:?}", gateway.relayer_address()),
        latest_block_time,
    };
    let status = if chain.connected { "ok" } else { "degraded" };
    Ok(ok(DetailedHealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        uptime: state.ctx.uptime_secs(),
        database,
        chain,
    }))
}

/// `GET /health/metrics`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    markets_by_status: BTreeMap<String, i64>,
    attestation_count: i64,
    participant_count: i64,
    pending_finalizations: i64,
    completed_finalizations: i64,
    recent_operations: Vec<SyncLogEntry>,
}

/// Aggregate counters and the last ten operation log entries.
pub async fn metrics(
    State(state): State<SharedState>,
) -> ApiResult<Json<ApiResponse<MetricsResponse>>> {
    let store = state.ctx.store();
    let counts = store.counts().await?;
    let by_status = store.market_counts_by_status().await?;
    let mut markets_by_status = BTreeMap::new();
    for (status, count) in by_status {
        let name = MarketStatus::from_i64(status)
            .map(|s| format!("{s:?}").to_lowercase())
            .unwrap_or_else(|| status.to_string());
        markets_by_status.insert(name, count);
    }
    let recent_operations = store.recent_sync_logs(10).await?;
    Ok(ok(MetricsResponse {
        markets_by_status,
        attestation_count: counts.attestations,
        participant_count: counts.participants,
        pending_finalizations: counts.pending_finalizations,
        completed_finalizations: counts.completed_finalizations,
        recent_operations,
    }))
}

/// `GET /health/queue`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    entries: Vec<FinalizationEntry>,
}

/// Up to 50 non-completed finalization queue entries.
pub async fn queue(
    State(state): State<SharedState>,
) -> ApiResult<Json<ApiResponse<QueueResponse>>> {
    let entries = state.ctx.store().pending_finalizations(50).await?;
    Ok(ok(QueueResponse { entries }))
}
