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

//! # Relayer Service Module 🎲
//!
//! A module for starting the long-running tasks of the relayer.
//!
//! ## Overview
//!
//! `ignite` (re-exported from the services crate) fires the background
//! reconcilers; `build_web_services` binds the HTTP API and serves it
//! until the context signals shutdown.

use std::net::SocketAddr;

use sidebet_relayer_context::RelayerContext;
use sidebet_relayer_handlers::{build_router, ApiState};
use sidebet_relayer_services::scheduler::Services;

pub use sidebet_relayer_services::scheduler::ignite;

/// Sets up the HTTP server for the relayer: routing, rate limiting and
/// CORS, served with a graceful shutdown tied to the context.
///
/// # Arguments
///
/// * `ctx` - RelayerContext that holds the configuration and handles
/// * `services` - the same service instances the scheduler drives
pub async fn build_web_services(
    ctx: RelayerContext,
    services: Services,
) -> crate::Result<()> {
    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), ctx.config.port);
    let mut shutdown = ctx.shutdown_signal();
    let state = ApiState::new(ctx, services);
    let app = build_router(state)
        .into_make_service_with_connect_info::<SocketAddr>();

    tracing::info!("Starting the server on {}", socket_addr);
    axum::Server::bind(&socket_addr)
        .serve(app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await;
        })
        .await?;
    Ok(())
}
