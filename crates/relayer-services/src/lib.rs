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

//! # Relayer Services Module 🎲
//!
//! The long-running coordination logic of the relayer.
//!
//! ## Overview
//!
//! Three cooperating services drive the store toward consistency with
//! the chain and markets toward finalization:
//!
//! 1. The [`SignatureService`] is the authoritative ingestion path for
//!    attestation signatures.
//! 2. The [`SyncService`] mirrors authoritative chain state into the
//!    store, per market and factory wide.
//! 3. The [`FinalizationService`] scans the queue, checks readiness, and
//!    submits finalization transactions through the chain gateway.
//!
//! The [`scheduler`] fires the reconcilers at fixed cadences; every
//! cross-tick piece of state lives in the store, never in memory.

use ethers::types::Address;

/// Finalization readiness and submission.
pub mod finalize;
/// The scheduler that fires the periodic reconcilers.
pub mod scheduler;
/// Attestation ingestion.
pub mod signature;
/// Chain-to-store reconciliation.
pub mod sync;

pub use finalize::FinalizationService;
pub use signature::SignatureService;
pub use sync::SyncService;

/// The number of attestations a market needs before finalization:
/// `ceil(eligible * threshold / 100)`, with an empty eligible set still
/// requiring one signature, lifted to the configured global minimum.
pub fn required_signatures(
    eligible: u64,
    threshold_percent: u64,
    min_global: u64,
) -> u64 {
    let base = if eligible == 0 {
        1
    } else {
        (eligible * threshold_percent + 99) / 100
    };
    base.max(min_global)
}

/// The canonical lower-case `0x`-prefixed form of an address, as stored
/// and served by the relayer.
pub fn address_string(address: Address) -> String {
    format!("{address:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_rounds_up() {
        // 5 participants at 60% need 3 signatures.
        assert_eq!(required_signatures(5, 60, 1), 3);
        // 3 participants at 51% need 2, not 1.
        assert_eq!(required_signatures(3, 51, 1), 2);
        // exact multiples do not round.
        assert_eq!(required_signatures(10, 60, 1), 6);
    }

    #[test]
    fn global_minimum_applies() {
        // the per-market requirement never drops below the global floor.
        assert_eq!(required_signatures(2, 51, 3), 3);
        // no eligible participants still requires max(1, minimum).
        assert_eq!(required_signatures(0, 60, 3), 3);
        assert_eq!(required_signatures(0, 60, 1), 1);
    }

    #[test]
    fn addresses_render_lowercase() {
        let address: Address = "0x00000000000000000000000000000000000000AB"
            .parse()
            .unwrap();
        assert_eq!(
            address_string(address),
            "0x00000000000000000000000000000000000000ab"
        );
    }
}
