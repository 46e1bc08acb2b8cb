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

use chrono::Utc;

use sidebet_relayer_utils::Result;

use crate::models::FinalizationEntry;
use crate::SqliteStore;

impl SqliteStore {
    /// Puts a market under finalization consideration, refreshing the
    /// cached counts from the current attestation and participant state.
    ///
    /// The upsert never touches a completed entry, so the sweeps can race
    /// freely: once `completed_at` is set the row is terminal.
    pub async fn enqueue_finalization(&self, market: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO finalization_queue (market_address,
                signature_count, eligible_count, proposal_outcome,
                threshold_met, last_checked_at)
             SELECT m.address,
                (SELECT COUNT(*) FROM attestations a
                  WHERE a.market_address = m.address
                    AND a.outcome = p.outcome AND a.is_valid = 1),
                (SELECT COUNT(*) FROM participants pt
                  WHERE pt.market_address = m.address
                    AND pt.outcome = p.outcome),
                p.outcome, 0, ?2
             FROM markets m
             JOIN proposals p
               ON p.market_address = m.address AND p.is_disputed = 0
             WHERE m.address = ?1
             ON CONFLICT (market_address) DO UPDATE SET
                signature_count = excluded.signature_count,
                eligible_count = excluded.eligible_count,
                proposal_outcome = excluded.proposal_outcome,
                last_checked_at = excluded.last_checked_at
             WHERE finalization_queue.completed_at IS NULL",
        )
        .bind(market.to_lowercase())
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// A single queue entry.
    pub async fn finalization_entry(
        &self,
        market: &str,
    ) -> Result<Option<FinalizationEntry>> {
        let entry = sqlx::query_as::<_, FinalizationEntry>(
            "SELECT * FROM finalization_queue WHERE market_address = ?1",
        )
        .bind(market.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(entry)
    }

    /// Non-completed entries, oldest check first.
    pub async fn pending_finalizations(
        &self,
        limit: i64,
    ) -> Result<Vec<FinalizationEntry>> {
        let entries = sqlx::query_as::<_, FinalizationEntry>(
            "SELECT * FROM finalization_queue
             WHERE completed_at IS NULL
             ORDER BY last_checked_at ASC
             LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(entries)
    }

    /// Refreshes the last-checked stamp of a pending entry.
    pub async fn touch_finalization(&self, market: &str) -> Result<()> {
        sqlx::query(
            "UPDATE finalization_queue SET last_checked_at = ?2
             WHERE market_address = ?1 AND completed_at IS NULL",
        )
        .bind(market.to_lowercase())
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Records a failed submit attempt. The entry stays pending and will
    /// be retried by the next sweep.
    pub async fn mark_finalization_attempted(
        &self,
        market: &str,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE finalization_queue SET
                attempted_at = ?2,
                last_checked_at = ?2,
                last_error = ?3
             WHERE market_address = ?1 AND completed_at IS NULL",
        )
        .bind(market.to_lowercase())
        .bind(Utc::now())
        .bind(error)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Transitions an entry to its terminal completed state.
    pub async fn mark_finalization_completed(&self, market: &str) -> Result<()> {
        sqlx::query(
            "UPDATE finalization_queue SET
                completed_at = ?2,
                last_checked_at = ?2,
                threshold_met = 1,
                last_error = NULL
             WHERE market_address = ?1 AND completed_at IS NULL",
        )
        .bind(market.to_lowercase())
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketRecord, MarketStatus};

    const MARKET: &str = "0x00000000000000000000000000000000000000ff";

    async fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_market(MarketRecord {
                address: MARKET.to_string(),
                topic: "topic".to_string(),
                threshold_percent: 60,
                staking_token: MARKET.to_string(),
                participant_count: 3,
                total_staked: "300".to_string(),
                status: MarketStatus::Proposed.as_i64(),
                created_at: Some(1_700_000_000),
                proposed_at: Some(1_700_000_100),
                resolved_at: None,
            })
            .await
            .unwrap();
        for (i, wallet) in [
            "0x00000000000000000000000000000000000000a1",
            "0x00000000000000000000000000000000000000a2",
            "0x00000000000000000000000000000000000000a3",
        ]
        .iter()
        .enumerate()
        {
            store
                .upsert_participant(MARKET, wallet, "100", (i > 0) as i64, false)
                .await
                .unwrap();
        }
        store
            .create_proposal(MARKET, MARKET, 1, 1_700_003_600, "", 1_700_000_100)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn enqueue_caches_current_counts() {
        let store = seeded_store().await;
        let proposal = store.active_proposal(MARKET).await.unwrap().unwrap();
        store
            .create_attestation(
                MARKET,
                "0x00000000000000000000000000000000000000a2",
                1,
                "1",
                "0xsig",
                proposal.id,
            )
            .await
            .unwrap();
        store.enqueue_finalization(MARKET).await.unwrap();
        let entry = store
            .finalization_entry(MARKET)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.proposal_outcome, 1);
        assert_eq!(entry.signature_count, 1);
        assert_eq!(entry.eligible_count, 2);
        assert!(entry.completed_at.is_none());
        // one row per market even when both sweeps enqueue.
        store.enqueue_finalization(MARKET).await.unwrap();
        assert_eq!(store.pending_finalizations(50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completed_entries_are_terminal() {
        let store = seeded_store().await;
        store.enqueue_finalization(MARKET).await.unwrap();
        store
            .mark_finalization_attempted(MARKET, "ChainUnavailable: timeout")
            .await
            .unwrap();
        let entry =
            store.finalization_entry(MARKET).await.unwrap().unwrap();
        assert!(entry.attempted_at.is_some());
        assert_eq!(
            entry.last_error.as_deref(),
            Some("ChainUnavailable: timeout")
        );

        store.mark_finalization_completed(MARKET).await.unwrap();
        let entry =
            store.finalization_entry(MARKET).await.unwrap().unwrap();
        assert!(entry.completed_at.is_some());
        assert!(entry.last_error.is_none());

        // a later enqueue must not resurrect the entry.
        store.enqueue_finalization(MARKET).await.unwrap();
        let entry =
            store.finalization_entry(MARKET).await.unwrap().unwrap();
        assert!(entry.completed_at.is_some());
        assert!(store.pending_finalizations(50).await.unwrap().is_empty());

        // and a failed-attempt record after completion is a no-op.
        store
            .mark_finalization_attempted(MARKET, "late failure")
            .await
            .unwrap();
        let entry =
            store.finalization_entry(MARKET).await.unwrap().unwrap();
        assert!(entry.last_error.is_none());
    }
}
