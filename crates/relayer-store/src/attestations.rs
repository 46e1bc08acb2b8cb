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

use sidebet_relayer_utils::{Error, Result};

use crate::models::{Attestation, FinalizationBundle};
use crate::SqliteStore;

impl SqliteStore {
    /// Persists an attestation. A prior valid row for the same
    /// (market, signer, nonce) triple surfaces as [`Error::Conflict`].
    pub async fn create_attestation(
        &self,
        market: &str,
        signer: &str,
        outcome: i64,
        nonce: &str,
        signature: &str,
        proposal_id: i64,
    ) -> Result<Attestation> {
        let result = sqlx::query_as::<_, Attestation>(
            "INSERT INTO attestations (market_address, proposal_id, signer,
                outcome, nonce, signature, is_valid, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
             RETURNING *",
        )
        .bind(market.to_lowercase())
        .bind(proposal_id)
        .bind(signer.to_lowercase())
        .bind(outcome)
        .bind(nonce)
        .bind(signature)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await;
        match result {
            Ok(attestation) => Ok(attestation),
            Err(sqlx::Error::Database(e))
                if matches!(
                    e.kind(),
                    sqlx::error::ErrorKind::UniqueViolation
                ) =>
            {
                Err(Error::Conflict(format!(
                    "attestation already recorded for signer {} with nonce {}",
                    signer.to_lowercase(),
                    nonce
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Count of valid attestations for a market and outcome.
    pub async fn count_valid_attestations(
        &self,
        market: &str,
        outcome: i64,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attestations
             WHERE market_address = ?1 AND outcome = ?2 AND is_valid = 1",
        )
        .bind(market.to_lowercase())
        .bind(outcome)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Refreshes the cached aggregate on a proposal row.
    pub async fn set_proposal_attestation_count(
        &self,
        proposal_id: i64,
        count: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE proposals SET attestation_count = ?1 WHERE id = ?2",
        )
        .bind(count)
        .bind(proposal_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Valid attestations of a market in submission order, optionally
    /// filtered by outcome.
    pub async fn attestations(
        &self,
        market: &str,
        outcome: Option<i64>,
    ) -> Result<Vec<Attestation>> {
        let attestations = match outcome {
            Some(outcome) => {
                sqlx::query_as::<_, Attestation>(
                    "SELECT * FROM attestations
                     WHERE market_address = ?1 AND outcome = ?2
                       AND is_valid = 1
                     ORDER BY submitted_at ASC, id ASC",
                )
                .bind(market.to_lowercase())
                .bind(outcome)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Attestation>(
                    "SELECT * FROM attestations
                     WHERE market_address = ?1 AND is_valid = 1
                     ORDER BY submitted_at ASC, id ASC",
                )
                .bind(market.to_lowercase())
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(attestations)
    }

    /// The signature bundle for an on-chain finalize call, in stable
    /// submission order.
    pub async fn attestations_for_finalization(
        &self,
        market: &str,
        outcome: i64,
    ) -> Result<FinalizationBundle> {
        let rows = self.attestations(market, Some(outcome)).await?;
        let mut bundle = FinalizationBundle::default();
        for row in rows {
            bundle.signatures.push(row.signature);
            bundle.nonces.push(row.nonce);
            bundle.signers.push(row.signer);
        }
        Ok(bundle)
    }

    /// Deletes every attestation of a market. Development helper only;
    /// the HTTP layer forbids this outside a development environment.
    pub async fn delete_attestations(&self, market: &str) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM attestations WHERE market_address = ?1",
        )
        .bind(market.to_lowercase())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketRecord, MarketStatus};

    const MARKET: &str = "0x00000000000000000000000000000000000000ff";
    const SIGNER: &str = "0x00000000000000000000000000000000000000B1";

    async fn seeded_store() -> (SqliteStore, i64) {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_market(MarketRecord {
                address: MARKET.to_string(),
                topic: "topic".to_string(),
                threshold_percent: 60,
                staking_token: MARKET.to_string(),
                participant_count: 2,
                total_staked: "100".to_string(),
                status: MarketStatus::Proposed.as_i64(),
                created_at: Some(1_700_000_000),
                proposed_at: Some(1_700_000_100),
                resolved_at: None,
            })
            .await
            .unwrap();
        let proposal = store
            .create_proposal(MARKET, SIGNER, 1, 1_700_003_600, "", 1_700_000_100)
            .await
            .unwrap();
        (store, proposal.id)
    }

    #[tokio::test]
    async fn duplicate_nonce_is_a_conflict() {
        let (store, proposal_id) = seeded_store().await;
        store
            .create_attestation(MARKET, SIGNER, 1, "7", "0xsig", proposal_id)
            .await
            .unwrap();
        let err = store
            .create_attestation(MARKET, SIGNER, 1, "7", "0xsig", proposal_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // the count reflects the first insert only.
        assert_eq!(
            store.count_valid_attestations(MARKET, 1).await.unwrap(),
            1
        );
        // a fresh nonce goes through.
        store
            .create_attestation(MARKET, SIGNER, 1, "8", "0xsig2", proposal_id)
            .await
            .unwrap();
        assert_eq!(
            store.count_valid_attestations(MARKET, 1).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn signer_addresses_are_stored_lowercase() {
        let (store, proposal_id) = seeded_store().await;
        let row = store
            .create_attestation(MARKET, SIGNER, 1, "1", "0xsig", proposal_id)
            .await
            .unwrap();
        assert_eq!(row.signer, SIGNER.to_lowercase());
    }

    #[tokio::test]
    async fn finalization_bundle_keeps_submission_order() {
        let (store, proposal_id) = seeded_store().await;
        let signers = [
            "0x00000000000000000000000000000000000000a1",
            "0x00000000000000000000000000000000000000a2",
            "0x00000000000000000000000000000000000000a3",
        ];
        for (i, signer) in signers.iter().enumerate() {
            store
                .create_attestation(
                    MARKET,
                    signer,
                    1,
                    &i.to_string(),
                    &format!("0xsig{i}"),
                    proposal_id,
                )
                .await
                .unwrap();
        }
        let bundle = store
            .attestations_for_finalization(MARKET, 1)
            .await
            .unwrap();
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.signers, signers);
        assert_eq!(bundle.nonces, ["0", "1", "2"]);
        // no attestations recorded for the other outcome.
        let other = store
            .attestations_for_finalization(MARKET, 0)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn delete_attestations_clears_the_market() {
        let (store, proposal_id) = seeded_store().await;
        store
            .create_attestation(MARKET, SIGNER, 1, "1", "0xsig", proposal_id)
            .await
            .unwrap();
        let removed = store.delete_attestations(MARKET).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            store.count_valid_attestations(MARKET, 1).await.unwrap(),
            0
        );
    }
}
