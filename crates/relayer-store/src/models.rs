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
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The lifecycle state of a market, mirrored from the chain.
///
/// The status is monotonic on the partial order
/// `Open → {Proposed, Cancelled}`, `Proposed → {Resolved, Disputed,
/// Cancelled}` and `Disputed → {Resolved, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    /// Accepting stakes.
    Open,
    /// A result has been proposed, the dispute window is running.
    Proposed,
    /// Finalized on-chain, payouts triggered.
    Resolved,
    /// The active proposal was challenged.
    Disputed,
    /// Terminated without resolution.
    Cancelled,
}

impl MarketStatus {
    /// Decodes the chain's numeric status.
    pub fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::Open),
            1 => Some(Self::Proposed),
            2 => Some(Self::Resolved),
            3 => Some(Self::Disputed),
            4 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// The chain's numeric encoding of this status.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Open => 0,
            Self::Proposed => 1,
            Self::Resolved => 2,
            Self::Disputed => 3,
            Self::Cancelled => 4,
        }
    }

    /// Whether the market can still be finalized.
    pub fn is_finalizable(&self) -> bool {
        !matches!(self, Self::Resolved | Self::Cancelled)
    }
}

/// A stored market, keyed by its lower-case on-chain address.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// The on-chain market address, lower-case.
    pub address: String,
    /// Short free text describing the bet.
    pub topic: String,
    /// Per-market attestation threshold, percent (51..=99).
    pub threshold_percent: i64,
    /// The staking token address, lower-case.
    pub staking_token: String,
    /// Number of participants, mirrored from chain.
    pub participant_count: i64,
    /// Total staked amount, decimal string.
    pub total_staked: String,
    /// Numeric [`MarketStatus`].
    pub status: i64,
    /// Chain time of creation, seconds.
    pub created_at: Option<i64>,
    /// Chain time of the proposal, seconds.
    pub proposed_at: Option<i64>,
    /// Chain time of resolution, seconds.
    pub resolved_at: Option<i64>,
    /// Wall time of the last successful sync.
    pub last_synced_at: DateTime<Utc>,
}

impl Market {
    /// The decoded status of this market.
    pub fn market_status(&self) -> Option<MarketStatus> {
        MarketStatus::from_i64(self.status)
    }
}

/// The input for [`crate::SqliteStore::upsert_market`].
#[derive(Debug, Clone)]
pub struct MarketRecord {
    /// The on-chain market address.
    pub address: String,
    /// Short free text describing the bet.
    pub topic: String,
    /// Per-market attestation threshold, percent.
    pub threshold_percent: i64,
    /// The staking token address.
    pub staking_token: String,
    /// Number of participants.
    pub participant_count: i64,
    /// Total staked amount, decimal string.
    pub total_staked: String,
    /// Numeric status.
    pub status: i64,
    /// Chain time of creation, seconds.
    pub created_at: Option<i64>,
    /// Chain time of the proposal, seconds.
    pub proposed_at: Option<i64>,
    /// Chain time of resolution, seconds.
    pub resolved_at: Option<i64>,
}

/// A (market, user) stake, mirrored from chain.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Row id.
    #[serde(skip_serializing)]
    pub id: i64,
    /// The market address, lower-case.
    pub market_address: String,
    /// The participant wallet, lower-case.
    pub user_address: String,
    /// Staked amount, decimal string.
    pub stake: String,
    /// Chosen outcome, 0 or 1.
    pub outcome: i64,
    /// Whether the chain has seen an attestation from this wallet.
    pub has_attested: bool,
}

/// A result proposed for a market.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Row id.
    pub id: i64,
    /// The market address, lower-case.
    pub market_address: String,
    /// The proposer wallet, lower-case.
    pub proposer: String,
    /// Proposed outcome, 0 or 1.
    pub outcome: i64,
    /// Chain time until which the proposal can be disputed, seconds.
    pub dispute_until: i64,
    /// Opaque evidence reference.
    pub evidence_hash: String,
    /// Cached count of valid attestations agreeing with this proposal.
    pub attestation_count: i64,
    /// Whether the proposal was challenged.
    pub is_disputed: bool,
    /// Chain time of creation, seconds.
    pub created_at: i64,
}

/// A stored attestation signature.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// Row id.
    pub id: i64,
    /// The market address, lower-case.
    pub market_address: String,
    /// The proposal this attestation agrees with.
    pub proposal_id: i64,
    /// The attesting wallet, lower-case.
    pub signer: String,
    /// Attested outcome, 0 or 1.
    pub outcome: i64,
    /// Attestation nonce, decimal string.
    pub nonce: String,
    /// The typed-data signature, 0x-prefixed hex (65 bytes).
    pub signature: String,
    /// Cleared when an attestation is invalidated administratively.
    pub is_valid: bool,
    /// Wall time of submission.
    pub submitted_at: DateTime<Utc>,
}

/// The signature bundle for an on-chain finalize call: three parallel
/// vectors in stable submission order.
#[derive(Debug, Clone, Default)]
pub struct FinalizationBundle {
    /// 0x-prefixed hex signatures.
    pub signatures: Vec<String>,
    /// Decimal-string nonces.
    pub nonces: Vec<String>,
    /// Lower-case signer addresses.
    pub signers: Vec<String>,
}

impl FinalizationBundle {
    /// Number of attestations in the bundle.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the bundle carries no attestations.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// One market under finalization consideration.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationEntry {
    /// The market address, lower-case.
    pub market_address: String,
    /// Cached count of valid attestations for the proposal outcome.
    pub signature_count: i64,
    /// Cached count of participants eligible for the proposal outcome.
    pub eligible_count: i64,
    /// The active proposal's outcome at enqueue time.
    pub proposal_outcome: i64,
    /// Whether the readiness threshold was met on the last check.
    pub threshold_met: bool,
    /// Wall time of the last readiness check.
    pub last_checked_at: DateTime<Utc>,
    /// Wall time of the last submit attempt, if any.
    pub attempted_at: Option<DateTime<Utc>>,
    /// Wall time of completion. Terminal once set.
    pub completed_at: Option<DateTime<Utc>>,
    /// The last submit error, if any.
    pub last_error: Option<String>,
}

/// An append-only record of a sync/finalize/dispute operation.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    /// Row id.
    pub id: i64,
    /// Operation name: `sync`, `finalize`, `dispute-scan`, ...
    pub operation: String,
    /// The market this operation touched, if any.
    pub market_address: Option<String>,
    /// `success`, `error` or `warning`.
    pub status: String,
    /// Free-text detail.
    pub message: Option<String>,
    /// Wall time of the record.
    pub created_at: DateTime<Utc>,
}

/// Row counts for the health endpoints.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCounts {
    /// Number of markets mirrored.
    pub markets: i64,
    /// Number of participant rows.
    pub participants: i64,
    /// Number of valid attestations.
    pub attestations: i64,
    /// Queue entries not yet completed.
    pub pending_finalizations: i64,
    /// Queue entries completed.
    pub completed_finalizations: i64,
}
