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

//! End-to-end flows over the in-memory store and the mocked gateway:
//! ingest, dedup, readiness, finalization retries and the sweeps.

use std::sync::Arc;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};

use sidebet_chain_gateway::typed_data::attestation_digest;
use sidebet_chain_gateway::{
    MarketInfo, MockedChainGateway, OnchainParticipant, OnchainProposal,
};
use sidebet_relayer_services::signature::AttestationSubmission;
use sidebet_relayer_services::{
    FinalizationService, SignatureService, SyncService,
};
use sidebet_relayer_store::models::MarketStatus;
use sidebet_relayer_store::SqliteStore;
use sidebet_relayer_utils::Error;

const CHAIN_ID: u64 = 31337;
const MIN_THRESHOLD: u64 = 3;
const MAX_PROPOSAL_AGE_SECS: u64 = 24 * 3600;
const T0: u64 = 1_700_000_000;
const DISPUTE_UNTIL: u64 = T0 + 3600;

struct Harness {
    store: SqliteStore,
    gateway: Arc<MockedChainGateway>,
    signature: SignatureService,
    finalization: FinalizationService,
    sync: SyncService,
    market: Address,
    wallets: Vec<LocalWallet>,
}

impl Harness {
    /// One market in Proposed status with an active YES proposal and one
    /// participant wallet per entry of `outcomes`.
    async fn new(outcomes: &[u8]) -> Self {
        let store = SqliteStore::in_memory().await.unwrap();
        let gateway = Arc::new(MockedChainGateway::new(CHAIN_ID));
        let market = Address::from_low_u64_be(0xbe7);
        let wallets: Vec<LocalWallet> = (0..outcomes.len())
            .map(|i| {
                LocalWallet::from_bytes(
                    H256::from_low_u64_be(i as u64 + 1).as_bytes(),
                )
                .unwrap()
            })
            .collect();

        gateway.insert_market(
            market,
            MarketInfo {
                topic: "will the merge happen this quarter".to_string(),
                threshold_percent: 60,
                staking_token: Address::from_low_u64_be(0xaa),
                participant_count: outcomes.len() as u64,
                total_staked: U256::exp10(18) * U256::from(outcomes.len()),
                status: MarketStatus::Proposed.as_i64() as u8,
                created_at: T0 - 86_400,
                proposed_at: Some(T0),
                resolved_at: None,
            },
        );
        gateway.insert_participants(
            market,
            wallets
                .iter()
                .zip(outcomes)
                .map(|(w, outcome)| OnchainParticipant {
                    wallet: w.address(),
                    stake: U256::exp10(18),
                    outcome: *outcome,
                    has_attested: false,
                })
                .collect(),
        );
        gateway.insert_proposal(
            market,
            OnchainProposal {
                proposer: wallets[0].address(),
                outcome: 1,
                dispute_until: DISPUTE_UNTIL,
                evidence_hash: H256::from_low_u64_be(0xe1),
                attestation_count: 1,
                is_disputed: false,
                created_at: T0,
            },
        );
        gateway.set_chain_time(T0);

        let signature = SignatureService::new(
            store.clone(),
            gateway.clone(),
            MIN_THRESHOLD,
        );
        let finalization = FinalizationService::new(
            store.clone(),
            gateway.clone(),
            MIN_THRESHOLD,
            MAX_PROPOSAL_AGE_SECS,
        );
        let sync = SyncService::new(store.clone(), gateway.clone());
        sync.sync_market(market).await.unwrap();

        Self {
            store,
            gateway,
            signature,
            finalization,
            sync,
            market,
            wallets,
        }
    }

    fn submission(
        &self,
        wallet: usize,
        outcome: u8,
        nonce: u64,
    ) -> AttestationSubmission {
        let wallet = &self.wallets[wallet];
        let digest = attestation_digest(
            CHAIN_ID,
            self.market,
            U256::from(outcome),
            U256::from(nonce),
        );
        AttestationSubmission {
            market: self.market,
            signer: wallet.address(),
            outcome,
            nonce: U256::from(nonce),
            signature: wallet.sign_hash(digest).unwrap(),
        }
    }

    fn market_str(&self) -> String {
        format!("{:?}", self.market)
    }
}

#[tokio::test]
async fn happy_path_finalizes_after_the_dispute_window() {
    let h = Harness::new(&[1, 1, 1, 1, 1]).await;

    // three of five participants attest before the window expires; the
    // count grows by one after each ingest.
    for (i, expected_count) in (0..3usize).zip(1i64..) {
        let outcome =
            h.signature.submit(h.submission(i, 1, 1)).await.unwrap();
        assert_eq!(outcome.signature_count, expected_count);
        assert_eq!(outcome.required_signatures, 3);
    }

    // required = ceil(5 * 60 / 100) = 3, so the market is queued.
    let entry = h
        .store
        .finalization_entry(&h.market_str())
        .await
        .unwrap()
        .expect("threshold hit queues the market");
    assert_eq!(entry.signature_count, 3);
    assert_eq!(entry.eligible_count, 5);

    // before the window expires nothing is submitted.
    assert_eq!(h.finalization.process_queue().await.unwrap(), 0);
    assert!(h.gateway.finalize_calls().is_empty());

    // at the boundary the strict `now >= dispute_until` check passes.
    h.gateway.set_chain_time(DISPUTE_UNTIL);
    assert_eq!(h.finalization.process_queue().await.unwrap(), 1);

    let calls = h.gateway.finalize_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].market, h.market);
    // signatures go on-chain in submission order.
    let expected_signers: Vec<Address> =
        h.wallets[..3].iter().map(|w| w.address()).collect();
    assert_eq!(calls[0].signers, expected_signers);

    // the entry is terminal and the resolved state is mirrored back.
    let entry = h
        .store
        .finalization_entry(&h.market_str())
        .await
        .unwrap()
        .unwrap();
    assert!(entry.completed_at.is_some());
    let market = h.store.market(&h.market_str()).await.unwrap().unwrap();
    assert_eq!(market.market_status(), Some(MarketStatus::Resolved));

    // a later sweep never resubmits a completed market.
    assert_eq!(h.finalization.process_queue().await.unwrap(), 0);
    assert_eq!(h.gateway.finalize_calls().len(), 1);
}

#[tokio::test]
async fn duplicate_submission_is_a_conflict() {
    let h = Harness::new(&[1, 1, 1]).await;
    let first = h.signature.submit(h.submission(0, 1, 7)).await.unwrap();
    assert_eq!(first.signature_count, 1);

    let err = h
        .signature
        .submit(h.submission(0, 1, 7))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // the stored count reflects the first insert only.
    assert_eq!(
        h.store
            .count_valid_attestations(&h.market_str(), 1)
            .await
            .unwrap(),
        1
    );
    // and a fresh nonce from the same signer is accepted.
    let second = h.signature.submit(h.submission(0, 1, 8)).await.unwrap();
    assert_eq!(second.signature_count, 2);
}

#[tokio::test]
async fn wrong_outcome_attestations_are_rejected() {
    // wallet 2 staked NO on a market whose proposal is YES.
    let h = Harness::new(&[1, 1, 0]).await;
    let err = h
        .signature
        .submit(h.submission(2, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::OutcomeMismatch {
            submitted: 1,
            expected: 0
        }
    ));
    // no row was written.
    assert!(h
        .signature
        .attestations(h.market, None)
        .await
        .unwrap()
        .is_empty());

    // a NO attestation against the YES proposal is also rejected, after
    // passing the participant check.
    let err = h
        .signature
        .submit(h.submission(2, 0, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::OutcomeMismatch {
            submitted: 0,
            expected: 1
        }
    ));
}

#[tokio::test]
async fn invalid_signatures_never_reach_the_store() {
    let h = Harness::new(&[1, 1, 1]).await;
    // signed by wallet 1 but claiming wallet 0.
    let mut submission = h.submission(1, 1, 1);
    submission.signer = h.wallets[0].address();
    let err = h.signature.submit(submission).await.unwrap_err();
    assert!(matches!(err, Error::SignatureInvalid));

    // an outsider wallet with a valid signature is not a participant.
    let outsider =
        LocalWallet::from_bytes(H256::from_low_u64_be(0x99).as_bytes())
            .unwrap();
    let digest =
        attestation_digest(CHAIN_ID, h.market, U256::one(), U256::one());
    let err = h
        .signature
        .submit(AttestationSubmission {
            market: h.market,
            signer: outsider.address(),
            outcome: 1,
            nonce: U256::one(),
            signature: outsider.sign_hash(digest).unwrap(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotParticipant { .. }));
    assert!(h
        .signature
        .attestations(h.market, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn chain_outage_during_finalize_is_retried_once_per_sweep() {
    let h = Harness::new(&[1, 1, 1]).await;
    for i in 0..3 {
        h.signature.submit(h.submission(i, 1, 1)).await.unwrap();
    }
    h.gateway.set_chain_time(DISPUTE_UNTIL + 1);
    h.gateway.fail_next_finalize(Error::ChainUnavailable(
        "connection refused".into(),
    ));

    // the failed attempt is recorded and the entry stays pending.
    assert_eq!(h.finalization.process_queue().await.unwrap(), 0);
    let entry = h
        .store
        .finalization_entry(&h.market_str())
        .await
        .unwrap()
        .unwrap();
    assert!(entry.completed_at.is_none());
    assert!(entry.attempted_at.is_some());
    assert!(entry
        .last_error
        .as_deref()
        .unwrap()
        .contains("connection refused"));

    // the next sweep succeeds; exactly one transaction goes out.
    assert_eq!(h.finalization.process_queue().await.unwrap(), 1);
    assert_eq!(h.gateway.finalize_calls().len(), 1);
    let entry = h
        .store
        .finalization_entry(&h.market_str())
        .await
        .unwrap()
        .unwrap();
    assert!(entry.completed_at.is_some());
    assert!(entry.last_error.is_none());
}

#[tokio::test]
async fn already_resolved_markets_short_circuit_to_completed() {
    let h = Harness::new(&[1, 1, 1]).await;
    for i in 0..3 {
        h.signature.submit(h.submission(i, 1, 1)).await.unwrap();
    }
    h.gateway.set_chain_time(DISPUTE_UNTIL + 1);
    // someone else finalized the market on-chain between sweeps.
    h.gateway.set_market_status(
        h.market,
        MarketStatus::Resolved.as_i64() as u8,
    );

    assert_eq!(h.finalization.process_queue().await.unwrap(), 1);
    // no transaction from us, but the entry is terminal.
    assert!(h.gateway.finalize_calls().is_empty());
    let entry = h
        .store
        .finalization_entry(&h.market_str())
        .await
        .unwrap()
        .unwrap();
    assert!(entry.completed_at.is_some());
}

#[tokio::test]
async fn expired_windows_are_enqueued_without_duplicates() {
    let h = Harness::new(&[1, 1, 1]).await;
    // the proposal landed with a dispute window already in the past
    // (clock skew); the sweep picks it up immediately.
    h.gateway.set_chain_time(DISPUTE_UNTIL + 10);
    assert_eq!(h.finalization.check_dispute_windows().await.unwrap(), 1);

    // attestations crossing the threshold enqueue the same market; the
    // queue stays unique per market.
    for i in 0..3 {
        h.signature.submit(h.submission(i, 1, 1)).await.unwrap();
    }
    assert_eq!(
        h.store.pending_finalizations(50).await.unwrap().len(),
        1
    );
    assert_eq!(h.finalization.process_queue().await.unwrap(), 1);
    assert_eq!(h.gateway.finalize_calls().len(), 1);
}

#[tokio::test]
async fn undercollected_stale_proposals_are_not_enqueued() {
    let h = Harness::new(&[1, 1, 1, 1, 1]).await;
    // two attestations, one short of the global minimum of three.
    for i in 0..2 {
        h.signature.submit(h.submission(i, 1, 1)).await.unwrap();
    }
    // age the proposal past the maximum age.
    h.gateway
        .set_chain_time(T0 + MAX_PROPOSAL_AGE_SECS + 60);

    assert_eq!(h.finalization.check_old_proposals().await.unwrap(), 0);
    assert!(h
        .store
        .finalization_entry(&h.market_str())
        .await
        .unwrap()
        .is_none());
    // the sweep leaves a warning in the operation log.
    let warnings: Vec<_> = h
        .store
        .recent_sync_logs(10)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.status == "warning")
        .collect();
    assert_eq!(warnings.len(), 1);

    // a third attestation lifts it over the minimum and the sweep queues
    // it.
    h.signature.submit(h.submission(2, 1, 1)).await.unwrap();
    assert_eq!(h.finalization.check_old_proposals().await.unwrap(), 1);
    assert!(h
        .store
        .finalization_entry(&h.market_str())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sync_is_idempotent() {
    let h = Harness::new(&[1, 1, 1]).await;
    let first = h.store.market(&h.market_str()).await.unwrap().unwrap();
    h.sync.sync_market(h.market).await.unwrap();
    let second = h.store.market(&h.market_str()).await.unwrap().unwrap();

    // bit-identical modulo the last-sync stamp.
    assert_eq!(first.topic, second.topic);
    assert_eq!(first.status, second.status);
    assert_eq!(first.participant_count, second.participant_count);
    assert_eq!(first.total_staked, second.total_staked);
    assert_eq!(h.store.participants(&h.market_str()).await.unwrap().len(), 3);
    // the proposal was not duplicated.
    let proposal =
        h.store.active_proposal(&h.market_str()).await.unwrap().unwrap();
    assert_eq!(proposal.dispute_until, DISPUTE_UNTIL as i64);
    assert_eq!(h.store.counts().await.unwrap().markets, 1);
}

#[tokio::test]
async fn disputed_proposals_stop_accepting_attestations() {
    let h = Harness::new(&[1, 1, 1]).await;
    // the chain reports the proposal as disputed now.
    h.gateway.insert_proposal(
        h.market,
        OnchainProposal {
            proposer: h.wallets[0].address(),
            outcome: 1,
            dispute_until: DISPUTE_UNTIL,
            evidence_hash: H256::from_low_u64_be(0xe1),
            attestation_count: 1,
            is_disputed: true,
            created_at: T0,
        },
    );
    h.sync.sync_market(h.market).await.unwrap();

    let err = h
        .signature
        .submit(h.submission(0, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoActiveProposal(_)));
}
