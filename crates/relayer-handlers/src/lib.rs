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

//! Relayer handlers for HTTP calls
//!
//! A thin layer over the signature, sync and store services: request
//! validation, rate limiting and routing. Every response is wrapped in
//! the `{success, ...}` envelope; errors map onto the relayer taxonomy.

#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use sidebet_relayer_context::RelayerContext;
use sidebet_relayer_services::scheduler::Services;

use crate::rate_limit::RateLimiter;

/// Error envelope for the API.
pub mod error;
/// Fixed-window per-IP rate limiting.
pub mod rate_limit;
/// Module handles relayer API
pub mod routes;
/// Boundary validation of addresses, signatures and numbers.
pub mod validation;

/// Shared state of the HTTP layer.
pub struct ApiState {
    /// The relayer context: config, store, gateway, shutdown.
    pub ctx: RelayerContext,
    /// The same service instances the scheduler drives.
    pub services: Services,
    /// Default (read) rate-limit tier.
    pub read_limiter: RateLimiter,
    /// Stricter write tier for attestation submission and sync triggers.
    pub write_limiter: RateLimiter,
}

/// The state handle every handler receives.
pub type SharedState = Arc<ApiState>;

impl ApiState {
    /// Builds the HTTP state, wiring the rate-limit tiers from the
    /// configuration.
    pub fn new(ctx: RelayerContext, services: Services) -> SharedState {
        let window =
            Duration::from_millis(ctx.config.rate_limit_window_ms);
        let read_limiter =
            RateLimiter::new(window, ctx.config.rate_limit_max_requests);
        let write_limiter = RateLimiter::new(
            window,
            ctx.config.write_rate_limit_max_requests,
        );
        Arc::new(Self {
            ctx,
            services,
            read_limiter,
            write_limiter,
        })
    }
}

/// Builds the complete application router: the `/health` surface
/// (never rate-limited) and the rate-limited `/api` surface.
pub fn build_router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/markets", get(routes::markets::list_markets))
        .route(
            "/markets/predict-address",
            post(routes::markets::predict_address),
        )
        .route("/markets/:address", get(routes::markets::market_detail))
        .route("/markets/:address/sync", post(routes::markets::sync_market))
        .route(
            "/markets/:address/participants",
            get(routes::markets::participants),
        )
        .route(
            "/markets/:address/proposal",
            get(routes::markets::proposal),
        )
        .route(
            "/markets/:address/status",
            get(routes::markets::live_status),
        )
        .route(
            "/attestations",
            get(routes::attestations::list_attestations)
                .post(routes::attestations::submit_attestation),
        )
        .route(
            "/attestations/:market",
            get(routes::attestations::market_attestations)
                .delete(routes::attestations::delete_attestations),
        )
        .route(
            "/attestations/:market/count",
            get(routes::attestations::attestation_counts),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ));

    let health = Router::new()
        .route("/health", get(routes::health::health))
        .route("/health/detailed", get(routes::health::detailed))
        .route("/health/metrics", get(routes::health::metrics))
        .route("/health/queue", get(routes::health::queue));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &SharedState) -> CorsLayer {
    let origins = state.ctx.config.allowed_origin_list();
    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}
