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

//! Sidebet Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix;

use sidebet_chain_gateway::{ChainGateway, EvmGateway};
use sidebet_relayer::service;
use sidebet_relayer_config::cli::{load_config, setup_logger, Opts};
use sidebet_relayer_context::RelayerContext;
use sidebet_relayer_store::SqliteStore;

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, "sidebet_relayer")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is read from the optional config directory and
    // the environment, then validated.
    let config = load_config(args.config_dir.clone())?;
    config.verify()?;

    // persistent storage for the relayer; the schema migration runs on
    // open and is idempotent.
    let store = SqliteStore::open(&config.database_url).await?;

    // the single point of contact with the chain, holding the hot wallet.
    let private_key = config
        .relayer_private_key
        .clone()
        .ok_or(sidebet_relayer_utils::Error::MissingSecrets)?;
    let gateway = EvmGateway::new(
        config.rpc_url.as_url(),
        config.chain_id,
        *private_key,
        config.factory_address,
        Duration::from_secs(config.chain_read_timeout_secs),
        Duration::from_secs(config.finalize_timeout_secs),
    )?;
    tracing::info!(
        chain_id = config.chain_id,
        relayer = ?gateway.relayer_address(),
        "chain gateway ready"
    );

    // The RelayerContext takes the configuration and the handles that
    // are needed throughout the lifetime of the relayer.
    let ctx = RelayerContext::new(config, store, Arc::new(gateway));

    // start all background reconcilers. This does not block; the jobs
    // are fired on background tasks.
    let services = service::ignite(&ctx).await?;

    // the web services: routing, validation, and rate limiting.
    let server_handle =
        tokio::spawn(service::build_web_services(ctx.clone(), services));

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
        },
    }

    tracing::warn!("Shutting down...");
    // send shutdown signal to all of the application tasks.
    ctx.shutdown();
    // in-flight ticks get a bounded grace period, then we exit
    // unconditionally.
    let grace = Duration::from_secs(ctx.config.shutdown_grace_secs);
    let _ = tokio::time::timeout(grace, server_handle).await;
    tracing::info!("Clean Exit ..");
    Ok(())
}
