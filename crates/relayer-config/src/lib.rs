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

#![warn(missing_docs)]

//! # Relayer Configuration Module 🎲
//!
//! A module for configuring the relayer.
//!
//! ## Overview
//!
//! The relayer configuration module is responsible for configuring the
//! relayer. The configuration is read from optional TOML/JSON files in a
//! config directory, and every field can be overridden through plain
//! environment variables (`PORT`, `DATABASE_URL`, `RPC_URL`, `CHAIN_ID`,
//! `RELAYER_PRIVATE_KEY`, ...). Secrets support the `$ENV_VAR` and
//! `file:` indirections of [`sidebet_relayer_types`].

/// CLI configuration
pub mod cli;
/// Utils for processing configuration
pub mod utils;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use sidebet_relayer_types::{private_key::PrivateKey, rpc_url::RpcUrl};

/// The default port the relayer will listen on. Defaults to 9955.
const fn default_port() -> u16 {
    9955
}
/// Default database url, a SQLite file next to the process.
fn default_database_url() -> String {
    "sqlite://sidebet-relayer.db".to_string()
}
/// The global minimum number of attestations required to finalize any
/// market, regardless of its own threshold. Defaults to `3`.
const fn default_min_signatures_threshold() -> u64 {
    3
}
/// Proposals older than this many hours are swept by the stale-proposal
/// scan. Defaults to `24`.
const fn default_max_proposal_age_hours() -> u64 {
    24
}
/// Rate limit window in milliseconds. Defaults to one minute.
const fn default_rate_limit_window_ms() -> u64 {
    60_000
}
/// Requests allowed per window on the default (read) tier.
const fn default_rate_limit_max_requests() -> u32 {
    100
}
/// Requests allowed per window on the write tier (attestation submission
/// and sync triggers).
const fn default_write_rate_limit_max_requests() -> u32 {
    10
}
/// Deadline for chain reads. Defaults to 30 seconds.
const fn default_chain_read_timeout_secs() -> u64 {
    30
}
/// Deadline for finalize confirmation waits. Defaults to 60 seconds.
const fn default_finalize_timeout_secs() -> u64 {
    60
}
/// Grace period for in-flight ticks on shutdown. Defaults to 10 seconds.
const fn default_shutdown_grace_secs() -> u64 {
    10
}
const fn default_sync_interval_secs() -> u64 {
    300
}
const fn default_market_stale_after_secs() -> u64 {
    300
}
const fn default_dispute_scan_interval_secs() -> u64 {
    120
}
const fn default_finalize_sweep_interval_secs() -> u64 {
    60
}
const fn default_stale_proposal_scan_interval_secs() -> u64 {
    3600
}
const fn default_log_cleanup_interval_secs() -> u64 {
    86_400
}
const fn default_log_retention_days() -> u64 {
    7
}

/// SidebetRelayerConfig is the configuration for the sidebet relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SidebetRelayerConfig {
    /// HTTP Server Port number
    ///
    /// default to 9955
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connection string for the relational store.
    #[serde(default = "default_database_url", skip_serializing)]
    pub database_url: String,
    /// Http(s) Endpoint of the chain RPC node.
    #[serde(skip_serializing)]
    pub rpc_url: RpcUrl,
    /// Chain specific id (output of chainId opcode on EVM networks),
    /// also part of the attestation typed-data domain.
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// The Private Key of the relayer hot wallet, used only for
    /// submitting finalization transactions.
    ///
    /// The format is more dynamic here:
    /// 1. if it starts with '0x' then this would be a raw (32 bytes) hex
    ///    encoded private key.
    /// 2. if it starts with '$' then it would be considered as an
    ///    Environment variable of a hex-encoded private key.
    /// 3. if it starts with 'file:' the key is read from that path.
    #[serde(default, skip_serializing)]
    pub relayer_private_key: Option<PrivateKey>,
    /// Address of the market factory contract. Optional; without it
    /// market discovery is disabled and `GetAllMarkets` is empty.
    #[serde(default)]
    pub factory_address: Option<Address>,
    /// The global minimum attestation count for finalization.
    #[serde(default = "default_min_signatures_threshold")]
    pub min_signatures_threshold: u64,
    /// Proposals older than this are handled by the stale-proposal scan.
    #[serde(default = "default_max_proposal_age_hours")]
    pub max_proposal_age_hours: u64,
    /// Fixed window size for both rate-limit tiers, in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    /// Requests allowed per window on the default tier.
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    /// Requests allowed per window on the write tier.
    #[serde(default = "default_write_rate_limit_max_requests")]
    pub write_rate_limit_max_requests: u32,
    /// Comma-separated list of allowed CORS origins. Empty means any.
    #[serde(default)]
    pub allowed_origins: Option<String>,
    /// Which environment the relayer runs in. The destructive dev-only
    /// API surface is rejected outside of `development`.
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    /// Deadline for chain reads, in seconds.
    #[serde(default = "default_chain_read_timeout_secs")]
    pub chain_read_timeout_secs: u64,
    /// Deadline for finalize confirmation waits, in seconds.
    #[serde(default = "default_finalize_timeout_secs")]
    pub finalize_timeout_secs: u64,
    /// Grace period for in-flight ticks on shutdown, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Cadences for the background reconcilers.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Which environment the relayer runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Local development; the destructive dev surface is allowed.
    #[default]
    Development,
    /// Anything reachable by real users.
    Production,
}

impl RuntimeEnvironment {
    /// Whether this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, RuntimeEnvironment::Development)
    }
}

/// SchedulerConfig holds the cadences of the periodic reconcilers.
///
/// Every job is single-instance: a tick that is still running suppresses
/// the next one (skip, not queue).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Market sync + discovery cadence, in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Markets whose last sync is older than this are re-synced.
    #[serde(default = "default_market_stale_after_secs")]
    pub market_stale_after_secs: u64,
    /// Dispute-window sweep cadence, in seconds.
    #[serde(default = "default_dispute_scan_interval_secs")]
    pub dispute_scan_interval_secs: u64,
    /// Finalization sweep cadence, in seconds.
    #[serde(default = "default_finalize_sweep_interval_secs")]
    pub finalize_sweep_interval_secs: u64,
    /// Stale-proposal sweep cadence, in seconds.
    #[serde(default = "default_stale_proposal_scan_interval_secs")]
    pub stale_proposal_scan_interval_secs: u64,
    /// Sync-log cleanup cadence, in seconds.
    #[serde(default = "default_log_cleanup_interval_secs")]
    pub log_cleanup_interval_secs: u64,
    /// Sync-log entries older than this many days are pruned.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            market_stale_after_secs: default_market_stale_after_secs(),
            dispute_scan_interval_secs: default_dispute_scan_interval_secs(),
            finalize_sweep_interval_secs:
                default_finalize_sweep_interval_secs(),
            stale_proposal_scan_interval_secs:
                default_stale_proposal_scan_interval_secs(),
            log_cleanup_interval_secs: default_log_cleanup_interval_secs(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

impl SidebetRelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    pub fn verify(&self) -> sidebet_relayer_utils::Result<()> {
        // The relayer submits finalization transactions, so the hot
        // wallet key **must** be present.
        if self.relayer_private_key.is_none() {
            return Err(sidebet_relayer_utils::Error::MissingSecrets);
        }
        if self.min_signatures_threshold == 0 {
            return Err(sidebet_relayer_utils::Error::Validation(
                "min_signatures_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The parsed CORS origin list, if any was configured.
    pub fn allowed_origin_list(&self) -> Vec<String> {
        self.allowed_origins
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
