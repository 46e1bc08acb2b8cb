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

//! # Relayer Store Module 🎲
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store owns all persistent off-chain state: users, markets,
//! participants, proposals, attestations, the finalization queue, and the
//! sync operation log. Everything is keyed by lower-case market/user
//! addresses, chain amounts and nonces are stored as decimal strings, and
//! all write paths are upserts or uniqueness-guarded inserts so they stay
//! safe under concurrent reconciler ticks.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use sidebet_relayer_utils::Result;

/// Attestation storage operations.
mod attestations;
/// Sync operation log storage.
mod logs;
/// Market, participant and proposal storage.
mod markets;
/// Data model for every persisted entity.
pub mod models;
/// Finalization queue storage.
mod queue;

pub use models::*;

/// The relational store, backed by SQLite through an async pool.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens the store at the given database url, creating the database
    /// file if it does not exist yet, and runs the schema migration.
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Opens an in-memory store. Used by tests.
    pub async fn in_memory() -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:")?;
        // a single connection, so every query sees the same memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Access to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the schema if it does not exist. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS users (
                address TEXT PRIMARY KEY NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS markets (
                address TEXT PRIMARY KEY NOT NULL,
                topic TEXT NOT NULL,
                threshold_percent INTEGER NOT NULL,
                staking_token TEXT NOT NULL,
                participant_count INTEGER NOT NULL DEFAULT 0,
                total_staked TEXT NOT NULL DEFAULT '0',
                status INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER,
                proposed_at INTEGER,
                resolved_at INTEGER,
                last_synced_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS participants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_address TEXT NOT NULL,
                user_address TEXT NOT NULL,
                stake TEXT NOT NULL DEFAULT '0',
                outcome INTEGER NOT NULL,
                has_attested INTEGER NOT NULL DEFAULT 0,
                UNIQUE (market_address, user_address)
            )",
            "CREATE TABLE IF NOT EXISTS proposals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_address TEXT NOT NULL,
                proposer TEXT NOT NULL,
                outcome INTEGER NOT NULL,
                dispute_until INTEGER NOT NULL,
                evidence_hash TEXT NOT NULL DEFAULT '',
                attestation_count INTEGER NOT NULL DEFAULT 0,
                is_disputed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            // At most one non-disputed proposal per market at any time.
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_proposals_active
                ON proposals (market_address) WHERE is_disputed = 0",
            "CREATE TABLE IF NOT EXISTS attestations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_address TEXT NOT NULL,
                proposal_id INTEGER NOT NULL,
                signer TEXT NOT NULL,
                outcome INTEGER NOT NULL,
                nonce TEXT NOT NULL,
                signature TEXT NOT NULL,
                is_valid INTEGER NOT NULL DEFAULT 1,
                submitted_at TEXT NOT NULL
            )",
            // (market, signer, nonce) is unique while the row is valid.
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_attestations_valid
                ON attestations (market_address, signer, nonce)
                WHERE is_valid = 1",
            "CREATE INDEX IF NOT EXISTS ix_attestations_market_outcome
                ON attestations (market_address, outcome, is_valid)",
            "CREATE TABLE IF NOT EXISTS finalization_queue (
                market_address TEXT PRIMARY KEY NOT NULL,
                signature_count INTEGER NOT NULL DEFAULT 0,
                eligible_count INTEGER NOT NULL DEFAULT 0,
                proposal_outcome INTEGER NOT NULL,
                threshold_met INTEGER NOT NULL DEFAULT 0,
                last_checked_at TEXT NOT NULL,
                attempted_at TEXT,
                completed_at TEXT,
                last_error TEXT
            )",
            "CREATE TABLE IF NOT EXISTS sync_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                operation TEXT NOT NULL,
                market_address TEXT,
                status TEXT NOT NULL,
                message TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS ix_sync_logs_created_at
                ON sync_logs (created_at)",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Per-entity row counts, used by the health endpoints.
    pub async fn counts(&self) -> Result<StoreCounts> {
        let markets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM markets")
            .fetch_one(&self.pool)
            .await?;
        let participants: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM participants")
                .fetch_one(&self.pool)
                .await?;
        let attestations: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attestations WHERE is_valid = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        let pending_finalizations: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM finalization_queue
             WHERE completed_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let completed_finalizations: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM finalization_queue
             WHERE completed_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreCounts {
            markets,
            participants,
            attestations,
            pending_finalizations,
            completed_finalizations,
        })
    }

    /// Market counts grouped by status, used by `/health/metrics`.
    pub async fn market_counts_by_status(&self) -> Result<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM markets GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.markets, 0);
        assert_eq!(counts.attestations, 0);
    }
}
