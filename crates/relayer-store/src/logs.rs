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

use crate::models::SyncLogEntry;
use crate::SqliteStore;

impl SqliteStore {
    /// Appends an operation record. The log is observability-only and
    /// never read back by the reconcilers.
    pub async fn log_sync_operation(
        &self,
        operation: &str,
        market: Option<&str>,
        status: &str,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_logs (operation, market_address, status,
                message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(operation)
        .bind(market.map(str::to_lowercase))
        .bind(status)
        .bind(message)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// The newest log entries, newest first.
    pub async fn recent_sync_logs(
        &self,
        limit: i64,
    ) -> Result<Vec<SyncLogEntry>> {
        let entries = sqlx::query_as::<_, SyncLogEntry>(
            "SELECT * FROM sync_logs
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(entries)
    }

    /// Deletes log entries older than `cutoff`. Returns the number of
    /// removed rows.
    pub async fn prune_sync_logs(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM sync_logs WHERE created_at < ?1")
                .bind(cutoff)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_entries_are_appended_and_pruned() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .log_sync_operation(
                "sync",
                Some("0x00000000000000000000000000000000000000FF"),
                "success",
                None,
            )
            .await
            .unwrap();
        store
            .log_sync_operation(
                "finalize",
                None,
                "error",
                Some("ChainUnavailable: timeout"),
            )
            .await
            .unwrap();

        let entries = store.recent_sync_logs(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        // newest first, market addresses lowercased.
        assert_eq!(entries[0].operation, "finalize");
        assert_eq!(
            entries[1].market_address.as_deref(),
            Some("0x00000000000000000000000000000000000000ff")
        );

        // nothing younger than the cutoff is pruned.
        let removed = store
            .prune_sync_logs(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        let removed = store
            .prune_sync_logs(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.recent_sync_logs(10).await.unwrap().is_empty());
    }
}
