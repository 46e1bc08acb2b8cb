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

//! Attestation API: submission, listing, counts, and the development
//! reset surface.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use sidebet_relayer_services::signature::{
    AttestationSubmission, IngestOutcome,
};
use sidebet_relayer_services::{address_string, required_signatures};
use sidebet_relayer_store::models::Attestation;

use crate::error::{ApiError, ApiResult};
use crate::routes::{ok, ApiResponse};
use crate::validation;
use crate::SharedState;

/// `POST /api/attestations` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    market: String,
    signer: String,
    outcome: String,
    nonce: String,
    signature: String,
}

/// Ingests an attestation signature.
pub async fn submit_attestation(
    State(state): State<SharedState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<Json<ApiResponse<IngestOutcome>>> {
    let market = validation::parse_address(&request.market)?;
    let signer = validation::parse_address(&request.signer)?;
    let outcome = validation::parse_outcome(&request.outcome)?;
    let nonce = validation::parse_uint(&request.nonce, "nonce")?;
    let signature = validation::parse_signature(&request.signature)?;
    let ingested = state
        .services
        .signature
        .submit(AttestationSubmission {
            market,
            signer,
            outcome,
            nonce,
            signature,
        })
        .await?;
    Ok(ok(ingested))
}

/// `GET /api/attestations` query string.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    market: Option<String>,
    outcome: Option<String>,
}

/// `GET /api/attestations` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationListResponse {
    market: String,
    attestations: Vec<Attestation>,
}

/// Lists attestations of a market in submission order.
pub async fn list_attestations(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ApiResponse<AttestationListResponse>>> {
    let market = query.market.as_deref().ok_or_else(|| {
        ApiError::validation("the market query parameter is required")
    })?;
    let market = validation::parse_address(market)?;
    let outcome = query
        .outcome
        .as_deref()
        .map(validation::parse_outcome)
        .transpose()?;
    let attestations = state
        .services
        .signature
        .attestations(market, outcome)
        .await?;
    Ok(ok(AttestationListResponse {
        market: address_string(market),
        attestations,
    }))
}

/// `GET /api/attestations/:market` — same listing, path-addressed.
pub async fn market_attestations(
    State(state): State<SharedState>,
    Path(market): Path<String>,
) -> ApiResult<Json<ApiResponse<AttestationListResponse>>> {
    let market = validation::parse_address(&market)?;
    let attestations =
        state.services.signature.attestations(market, None).await?;
    Ok(ok(AttestationListResponse {
        market: address_string(market),
        attestations,
    }))
}

/// `GET /api/attestations/:market/count` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    market: String,
    yes: i64,
    no: i64,
    threshold_percent: Option<i64>,
    required_signatures: Option<i64>,
    eligible_count: Option<i64>,
    min_signatures_threshold: u64,
}

/// Attestation counts with the market's threshold requirement.
pub async fn attestation_counts(
    State(state): State<SharedState>,
    Path(market): Path<String>,
) -> ApiResult<Json<ApiResponse<CountResponse>>> {
    let market = validation::parse_address(&market)?;
    let key = address_string(market);
    let store = state.ctx.store();
    let market_row = store.market(&key).await?.ok_or_else(|| {
        ApiError::not_found(format!("market {key} is not known"))
    })?;
    let yes = store.count_valid_attestations(&key, 1).await?;
    let no = store.count_valid_attestations(&key, 0).await?;
    // the requirement is defined by the active proposal's outcome.
    let mut required = None;
    let mut eligible = None;
    if let Some(proposal) = store.active_proposal(&key).await? {
        let eligible_count = store
            .count_eligible_participants(&key, proposal.outcome)
            .await?;
        eligible = Some(eligible_count);
        required = Some(required_signatures(
            eligible_count as u64,
            market_row.threshold_percent as u64,
            state.ctx.config.min_signatures_threshold,
        ) as i64);
    }
    Ok(ok(CountResponse {
        market: key,
        yes,
        no,
        threshold_percent: Some(market_row.threshold_percent),
        required_signatures: required,
        eligible_count: eligible,
        min_signatures_threshold: state
            .ctx
            .config
            .min_signatures_threshold,
    }))
}

/// `DELETE /api/attestations/:market` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    market: String,
    deleted: u64,
}

/// Clears a market's attestations. Development environments only.
pub async fn delete_attestations(
    State(state): State<SharedState>,
    Path(market): Path<String>,
) -> ApiResult<Json<ApiResponse<DeleteResponse>>> {
    if !state.ctx.config.environment.is_development() {
        return Err(ApiError::forbidden(
            "attestation deletion is only available in development",
        ));
    }
    let market = validation::parse_address(&market)?;
    let key = address_string(market);
    let deleted = state.ctx.store().delete_attestations(&key).await?;
    tracing::warn!(market = %key, deleted, "attestations deleted via the dev surface");
    Ok(ok(DeleteResponse {
        market: key,
        deleted,
    }))
}
