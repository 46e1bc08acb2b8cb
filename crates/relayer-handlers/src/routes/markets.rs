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

//! Market API: listing, detail, sync triggers, participants, proposals,
//! deterministic address prediction and live chain status.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use sidebet_chain_gateway::ChainGateway;
use sidebet_relayer_services::address_string;
use sidebet_relayer_store::models::{Market, Participant, Proposal};

use crate::error::{ApiError, ApiResult};
use crate::routes::{ok, ApiResponse};
use crate::validation;
use crate::SharedState;

/// A market row together with its active proposal summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketView {
    #[serde(flatten)]
    market: Market,
    proposal: Option<Proposal>,
}

/// `GET /api/markets` query string.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// `GET /api/markets` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketListResponse {
    markets: Vec<MarketView>,
    limit: i64,
    offset: i64,
}

/// Paginated market list, optionally filtered by status.
pub async fn list_markets(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ApiResponse<MarketListResponse>>> {
    let status = validation::parse_status(query.status)?;
    let limit = validation::parse_limit(query.limit)?;
    let offset = validation::parse_offset(query.offset)?;
    let store = state.ctx.store();
    let markets = store.list_markets(status, limit, offset).await?;
    let mut views = Vec::with_capacity(markets.len());
    for market in markets {
        let proposal = store.active_proposal(&market.address).await?;
        views.push(MarketView { market, proposal });
    }
    Ok(ok(MarketListResponse {
        markets: views,
        limit,
        offset,
    }))
}

/// `GET /api/markets/:address` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDetailResponse {
    #[serde(flatten)]
    market: Market,
    proposal: Option<Proposal>,
    attestations: OutcomeCounts,
}

/// Valid attestation counts per outcome.
#[derive(Debug, Serialize)]
pub struct OutcomeCounts {
    /// Attestations for outcome 1.
    pub yes: i64,
    /// Attestations for outcome 0.
    pub no: i64,
}

/// Full market view. An unknown market gets one synchronous sync from
/// the chain before the relayer gives up on it.
pub async fn market_detail(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<ApiResponse<MarketDetailResponse>>> {
    let market = validation::parse_address(&address)?;
    let key = address_string(market);
    let store = state.ctx.store();
    let row = match store.market(&key).await? {
        Some(row) => row,
        None => {
            if let Err(e) = state.services.sync.sync_market(market).await {
                tracing::debug!(market = %key, ?e, "one-shot sync failed");
            }
            store.market(&key).await?.ok_or_else(|| {
                ApiError::not_found(format!("market {key} is not known"))
            })?
        }
    };
    let proposal = store.active_proposal(&key).await?;
    let attestations = OutcomeCounts {
        yes: store.count_valid_attestations(&key, 1).await?,
        no: store.count_valid_attestations(&key, 0).await?,
    };
    Ok(ok(MarketDetailResponse {
        market: row,
        proposal,
        attestations,
    }))
}

/// `POST /api/markets/:address/sync` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    market: Market,
}

/// Triggers a single-market sync and returns its result.
pub async fn sync_market(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<ApiResponse<SyncResponse>>> {
    let market = validation::parse_address(&address)?;
    let market = state.services.sync.sync_market(market).await?;
    Ok(ok(SyncResponse { market }))
}

/// `GET /api/markets/:address/participants` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsResponse {
    participants: Vec<Participant>,
}

/// All participants of a market.
pub async fn participants(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<ApiResponse<ParticipantsResponse>>> {
    let market = validation::parse_address(&address)?;
    let key = address_string(market);
    state.ctx.store().market(&key).await?.ok_or_else(|| {
        ApiError::not_found(format!("market {key} is not known"))
    })?;
    let participants = state.ctx.store().participants(&key).await?;
    Ok(ok(ParticipantsResponse { participants }))
}

/// `GET /api/markets/:address/proposal` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    proposal: Proposal,
    attestations: Vec<sidebet_relayer_store::models::Attestation>,
}

/// The active proposal of a market plus its attestations.
pub async fn proposal(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<ApiResponse<ProposalResponse>>> {
    let market = validation::parse_address(&address)?;
    let key = address_string(market);
    let store = state.ctx.store();
    let proposal = store.active_proposal(&key).await?.ok_or_else(|| {
        ApiError::not_found(format!("no active proposal for market {key}"))
    })?;
    let attestations =
        store.attestations(&key, Some(proposal.outcome)).await?;
    Ok(ok(ProposalResponse {
        proposal,
        attestations,
    }))
}

/// `POST /api/markets/predict-address` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictAddressRequest {
    topic: String,
    threshold_percent: u8,
    token: String,
    min_stake: String,
    salt: Option<String>,
}

/// `POST /api/markets/predict-address` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictAddressResponse {
    predicted_address: String,
}

/// CREATE2-style deterministic address derivation, delegated to the
/// factory contract.
pub async fn predict_address(
    State(state): State<SharedState>,
    Json(request): Json<PredictAddressRequest>,
) -> ApiResult<Json<ApiResponse<PredictAddressResponse>>> {
    if request.topic.is_empty() {
        return Err(ApiError::validation("topic must not be empty"));
    }
    let threshold = validation::parse_threshold(request.threshold_percent)?;
    let token = validation::parse_address(&request.token)?;
    let min_stake = validation::parse_uint(&request.min_stake, "minStake")?;
    let salt = validation::parse_salt(request.salt.as_deref())?;
    let predicted = state
        .ctx
        .gateway()
        .predict_market_address(
            &request.topic,
            threshold,
            token,
            min_stake,
            salt,
        )
        .await?;
    Ok(ok(PredictAddressResponse {
        predicted_address: address_string(predicted),
    }))
}

/// `GET /api/markets/:address/status` response: a live chain read, not
/// the mirrored store state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatusResponse {
    address: String,
    status: u8,
    proposal: Option<LiveProposal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveProposal {
    proposer: String,
    outcome: u8,
    dispute_until: u64,
    attestation_count: u64,
    is_disputed: bool,
}

/// Reads status and proposal straight from the chain.
pub async fn live_status(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<ApiResponse<LiveStatusResponse>>> {
    let market = validation::parse_address(&address)?;
    let gateway = state.ctx.gateway();
    let info = gateway.market_info(market).await?;
    let proposal = gateway.proposal(market).await?.map(|p| LiveProposal {
        proposer: address_string(p.proposer),
        outcome: p.outcome,
        dispute_until: p.dispute_until,
        attestation_count: p.attestation_count,
        is_disputed: p.is_disputed,
    });
    Ok(ok(LiveStatusResponse {
        address: address_string(market),
        status: info.status,
        proposal,
    }))
}
