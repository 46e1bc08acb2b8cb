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

use chrono::{DateTime, Utc};

use sidebet_relayer_utils::Result;

use crate::models::{Market, MarketRecord, Participant, Proposal};
use crate::SqliteStore;

impl SqliteStore {
    /// Inserts or updates a market by address and stamps `last_synced_at`.
    /// Idempotent; the address and token are stored lower-case.
    pub async fn upsert_market(&self, record: MarketRecord) -> Result<Market> {
        let address = record.address.to_lowercase();
        let staking_token = record.staking_token.to_lowercase();
        let market = sqlx::query_as::<_, Market>(
            "INSERT INTO markets (address, topic, threshold_percent,
                staking_token, participant_count, total_staked, status,
                created_at, proposed_at, resolved_at, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (address) DO UPDATE SET
                topic = excluded.topic,
                threshold_percent = excluded.threshold_percent,
                staking_token = excluded.staking_token,
                participant_count = excluded.participant_count,
                total_staked = excluded.total_staked,
                status = excluded.status,
                created_at = excluded.created_at,
                proposed_at = excluded.proposed_at,
                resolved_at = excluded.resolved_at,
                last_synced_at = excluded.last_synced_at
             RETURNING *",
        )
        .bind(&address)
        .bind(&record.topic)
        .bind(record.threshold_percent)
        .bind(&staking_token)
        .bind(record.participant_count)
        .bind(&record.total_staked)
        .bind(record.status)
        .bind(record.created_at)
        .bind(record.proposed_at)
        .bind(record.resolved_at)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(market)
    }

    /// Fetches a market by address, case-insensitively.
    pub async fn market(&self, address: &str) -> Result<Option<Market>> {
        let market = sqlx::query_as::<_, Market>(
            "SELECT * FROM markets WHERE address = ?1",
        )
        .bind(address.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(market)
    }

    /// Lists markets, newest first, optionally filtered by status.
    pub async fn list_markets(
        &self,
        status: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Market>> {
        let markets = match status {
            Some(status) => {
                sqlx::query_as::<_, Market>(
                    "SELECT * FROM markets WHERE status = ?1
                     ORDER BY created_at DESC, address ASC
                     LIMIT ?2 OFFSET ?3",
                )
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Market>(
                    "SELECT * FROM markets
                     ORDER BY created_at DESC, address ASC
                     LIMIT ?1 OFFSET ?2",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(markets)
    }

    /// Addresses of markets whose last sync is older than `cutoff`.
    pub async fn stale_markets(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let addresses: Vec<(String,)> = sqlx::query_as(
            "SELECT address FROM markets WHERE last_synced_at < ?1",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;
        Ok(addresses.into_iter().map(|(a,)| a).collect())
    }

    /// All market addresses known to the store.
    pub async fn market_addresses(&self) -> Result<Vec<String>> {
        let addresses: Vec<(String,)> =
            sqlx::query_as("SELECT address FROM markets")
                .fetch_all(self.pool())
                .await?;
        Ok(addresses.into_iter().map(|(a,)| a).collect())
    }

    /// Inserts or updates a (market, user) participant row, creating the
    /// user row lazily on first reference.
    pub async fn upsert_participant(
        &self,
        market: &str,
        user: &str,
        stake: &str,
        outcome: i64,
        has_attested: bool,
    ) -> Result<Participant> {
        let market = market.to_lowercase();
        let user = user.to_lowercase();
        sqlx::query(
            "INSERT INTO users (address, created_at) VALUES (?1, ?2)
             ON CONFLICT (address) DO NOTHING",
        )
        .bind(&user)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        let participant = sqlx::query_as::<_, Participant>(
            "INSERT INTO participants
                (market_address, user_address, stake, outcome, has_attested)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (market_address, user_address) DO UPDATE SET
                stake = excluded.stake,
                outcome = excluded.outcome,
                has_attested = excluded.has_attested
             RETURNING *",
        )
        .bind(&market)
        .bind(&user)
        .bind(stake)
        .bind(outcome)
        .bind(has_attested)
        .fetch_one(self.pool())
        .await?;
        Ok(participant)
    }

    /// All participants of a market.
    pub async fn participants(&self, market: &str) -> Result<Vec<Participant>> {
        let participants = sqlx::query_as::<_, Participant>(
            "SELECT * FROM participants WHERE market_address = ?1
             ORDER BY id ASC",
        )
        .bind(market.to_lowercase())
        .fetch_all(self.pool())
        .await?;
        Ok(participants)
    }

    /// A single (market, user) participant row.
    pub async fn participant(
        &self,
        market: &str,
        user: &str,
    ) -> Result<Option<Participant>> {
        let participant = sqlx::query_as::<_, Participant>(
            "SELECT * FROM participants
             WHERE market_address = ?1 AND user_address = ?2",
        )
        .bind(market.to_lowercase())
        .bind(user.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(participant)
    }

    /// Number of participants of a market whose chosen outcome equals
    /// `outcome`. This is the eligible-participant count of the readiness
    /// computation.
    pub async fn count_eligible_participants(
        &self,
        market: &str,
        outcome: i64,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM participants
             WHERE market_address = ?1 AND outcome = ?2",
        )
        .bind(market.to_lowercase())
        .bind(outcome)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Creates a proposal for a market, unless a non-disputed proposal
    /// already exists; in either case the active proposal is returned.
    /// Concurrent creations are resolved by the partial unique index.
    pub async fn create_proposal(
        &self,
        market: &str,
        proposer: &str,
        outcome: i64,
        dispute_until: i64,
        evidence_hash: &str,
        created_at: i64,
    ) -> Result<Proposal> {
        let market = market.to_lowercase();
        sqlx::query(
            "INSERT INTO proposals (market_address, proposer, outcome,
                dispute_until, evidence_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (market_address) WHERE is_disputed = 0
             DO NOTHING",
        )
        .bind(&market)
        .bind(proposer.to_lowercase())
        .bind(outcome)
        .bind(dispute_until)
        .bind(evidence_hash)
        .bind(created_at)
        .execute(self.pool())
        .await?;
        let active = self.active_proposal(&market).await?;
        active.ok_or_else(|| {
            sidebet_relayer_utils::Error::NoActiveProposal(market)
        })
    }

    /// The newest non-disputed proposal of a market, if any.
    pub async fn active_proposal(
        &self,
        market: &str,
    ) -> Result<Option<Proposal>> {
        let proposal = sqlx::query_as::<_, Proposal>(
            "SELECT * FROM proposals
             WHERE market_address = ?1 AND is_disputed = 0
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(market.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(proposal)
    }

    /// Marks the active proposal of a market as disputed, mirroring a
    /// chain-side dispute.
    pub async fn mark_proposal_disputed(&self, market: &str) -> Result<()> {
        sqlx::query(
            "UPDATE proposals SET is_disputed = 1
             WHERE market_address = ?1 AND is_disputed = 0",
        )
        .bind(market.to_lowercase())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Non-disputed proposals whose dispute window has expired and whose
    /// market is still finalizable.
    pub async fn proposals_with_expired_windows(
        &self,
        chain_now: i64,
    ) -> Result<Vec<Proposal>> {
        let proposals = sqlx::query_as::<_, Proposal>(
            "SELECT p.* FROM proposals p
             JOIN markets m ON m.address = p.market_address
             WHERE p.is_disputed = 0
               AND p.dispute_until <= ?1
               AND m.status NOT IN (2, 4)",
        )
        .bind(chain_now)
        .fetch_all(self.pool())
        .await?;
        Ok(proposals)
    }

    /// Non-disputed proposals created before `created_before` whose market
    /// is still in Proposed status. Input for the stale-proposal sweep.
    pub async fn aged_active_proposals(
        &self,
        created_before: i64,
    ) -> Result<Vec<Proposal>> {
        let proposals = sqlx::query_as::<_, Proposal>(
            "SELECT p.* FROM proposals p
             JOIN markets m ON m.address = p.market_address
             WHERE p.is_disputed = 0
               AND p.created_at < ?1
               AND m.status = 1",
        )
        .bind(created_before)
        .fetch_all(self.pool())
        .await?;
        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketStatus;

    fn record(address: &str) -> MarketRecord {
        MarketRecord {
            address: address.to_string(),
            topic: "will it rain tomorrow".to_string(),
            threshold_percent: 60,
            staking_token: "0x00000000000000000000000000000000000000aa"
                .to_string(),
            participant_count: 5,
            total_staked: "5000000000000000000".to_string(),
            status: MarketStatus::Open.as_i64(),
            created_at: Some(1_700_000_000),
            proposed_at: None,
            resolved_at: None,
        }
    }

    const MARKET: &str = "0x00000000000000000000000000000000000000Ff";

    #[tokio::test]
    async fn upsert_market_is_idempotent_and_lowercases() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = store.upsert_market(record(MARKET)).await.unwrap();
        assert_eq!(first.address, MARKET.to_lowercase());
        let second = store.upsert_market(record(MARKET)).await.unwrap();
        assert_eq!(first.address, second.address);
        assert_eq!(store.counts().await.unwrap().markets, 1);
        // mixed-case lookups hit the same row.
        let fetched = store.market(MARKET).await.unwrap().unwrap();
        assert_eq!(fetched.topic, "will it rain tomorrow");
    }

    #[tokio::test]
    async fn participant_rows_are_unique_per_market_and_user() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_market(record(MARKET)).await.unwrap();
        let user = "0x00000000000000000000000000000000000000B1";
        store
            .upsert_participant(MARKET, user, "100", 1, false)
            .await
            .unwrap();
        let updated = store
            .upsert_participant(MARKET, user, "250", 1, true)
            .await
            .unwrap();
        assert_eq!(updated.stake, "250");
        assert!(updated.has_attested);
        assert_eq!(store.participants(MARKET).await.unwrap().len(), 1);
        assert_eq!(
            store.count_eligible_participants(MARKET, 1).await.unwrap(),
            1
        );
        assert_eq!(
            store.count_eligible_participants(MARKET, 0).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn only_one_active_proposal_per_market() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_market(record(MARKET)).await.unwrap();
        let proposer = "0x00000000000000000000000000000000000000C2";
        let first = store
            .create_proposal(MARKET, proposer, 1, 1_700_003_600, "", 1_700_000_000)
            .await
            .unwrap();
        // the second creation is a no-op and returns the existing one.
        let second = store
            .create_proposal(MARKET, proposer, 0, 1_700_007_200, "", 1_700_000_100)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.outcome, 1);
        // once disputed, a fresh proposal can be created.
        store.mark_proposal_disputed(MARKET).await.unwrap();
        let third = store
            .create_proposal(MARKET, proposer, 0, 1_700_007_200, "", 1_700_000_200)
            .await
            .unwrap();
        assert_ne!(first.id, third.id);
        assert_eq!(third.outcome, 0);
    }

    #[tokio::test]
    async fn stale_markets_respects_cutoff() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_market(record(MARKET)).await.unwrap();
        let future = Utc::now() + chrono::Duration::seconds(60);
        let past = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(store.stale_markets(future).await.unwrap().len(), 1);
        assert!(store.stale_markets(past).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_windows_skip_resolved_markets() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut rec = record(MARKET);
        rec.status = MarketStatus::Proposed.as_i64();
        store.upsert_market(rec).await.unwrap();
        store
            .create_proposal(MARKET, MARKET, 1, 1_700_000_500, "", 1_700_000_000)
            .await
            .unwrap();
        let expired = store
            .proposals_with_expired_windows(1_700_000_500)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        // resolve the market, the proposal leaves the sweep.
        let mut rec = record(MARKET);
        rec.status = MarketStatus::Resolved.as_i64();
        store.upsert_market(rec).await.unwrap();
        let expired = store
            .proposals_with_expired_windows(1_700_000_500)
            .await
            .unwrap();
        assert!(expired.is_empty());
    }
}
