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

//! Integration tests for the relayer HTTP surface, end to end over the
//! in-memory store and the mocked chain gateway.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use serde_json::json;

use sidebet_chain_gateway::typed_data::attestation_digest;
use sidebet_chain_gateway::{
    MarketInfo, MockedChainGateway, OnchainParticipant, OnchainProposal,
};
use sidebet_relayer_config::{RuntimeEnvironment, SidebetRelayerConfig};
use sidebet_relayer_context::RelayerContext;
use sidebet_relayer_handlers::{build_router, ApiState};
use sidebet_relayer_services::scheduler::Services;
use sidebet_relayer_store::SqliteStore;

const CHAIN_ID: u64 = 31337;
const T0: u64 = 1_700_000_000;
const DISPUTE_UNTIL: u64 = T0 + 3600;

fn test_config() -> SidebetRelayerConfig {
    SidebetRelayerConfig {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        rpc_url: url::Url::parse("http://localhost:8545").unwrap().into(),
        chain_id: CHAIN_ID,
        relayer_private_key: Some(H256::from_low_u64_be(0xbeef).into()),
        factory_address: None,
        min_signatures_threshold: 3,
        max_proposal_age_hours: 24,
        rate_limit_window_ms: 60_000,
        rate_limit_max_requests: 100,
        write_rate_limit_max_requests: 10,
        allowed_origins: None,
        environment: RuntimeEnvironment::Development,
        chain_read_timeout_secs: 30,
        finalize_timeout_secs: 60,
        shutdown_grace_secs: 10,
        scheduler: Default::default(),
    }
}

struct Harness {
    server: TestServer,
    market: Address,
    wallets: Vec<LocalWallet>,
}

impl Harness {
    async fn new(config: SidebetRelayerConfig) -> Self {
        let store = SqliteStore::in_memory().await.unwrap();
        let gateway = Arc::new(MockedChainGateway::new(CHAIN_ID));
        let market = Address::from_low_u64_be(0xbe7);
        let wallets: Vec<LocalWallet> = (1..=5u64)
            .map(|i| {
                LocalWallet::from_bytes(
                    H256::from_low_u64_be(i).as_bytes(),
                )
                .unwrap()
            })
            .collect();

        gateway.insert_market(
            market,
            MarketInfo {
                topic: "will it ship before the deadline".to_string(),
                threshold_percent: 60,
                staking_token: Address::from_low_u64_be(0xaa),
                participant_count: 5,
                total_staked: U256::exp10(18) * U256::from(5u64),
                status: 1,
                created_at: T0 - 86_400,
                proposed_at: Some(T0),
                resolved_at: None,
            },
        );
        gateway.insert_participants(
            market,
            wallets
                .iter()
                .map(|w| OnchainParticipant {
                    wallet: w.address(),
                    stake: U256::exp10(18),
                    outcome: 1,
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

        let ctx = RelayerContext::new(config, store, gateway);
        let services = Services::new(&ctx);
        // mirror the scripted chain into the store.
        services.sync.sync_market(market).await.unwrap();
        let state = ApiState::new(ctx, services);
        let server =
            TestServer::new(build_router(state).into_make_service())
                .unwrap();
        Self {
            server,
            market,
            wallets,
        }
    }

    fn market_str(&self) -> String {
        format!("{:?}", self.market)
    }

    fn attestation_body(
        &self,
        wallet: usize,
        outcome: u8,
        nonce: u64,
    ) -> serde_json::Value {
        let wallet = &self.wallets[wallet];
        let digest = attestation_digest(
            CHAIN_ID,
            self.market,
            U256::from(outcome),
            U256::from(nonce),
        );
        let signature = wallet.sign_hash(digest).unwrap();
        json!({
            "market": self.market_str(),
            "signer": format!("{:?}", wallet.address()),
            "outcome": outcome.to_string(),
            "nonce": nonce.to_string(),
            "signature": format!("0x{signature}"),
        })
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let h = Harness::new(test_config()).await;
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].is_number());
}

#[tokio::test]
async fn detailed_health_carries_chain_and_database_state() {
    let h = Harness::new(test_config()).await;
    let response = h.server.get("/health/detailed").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["chain"]["connected"], true);
    assert_eq!(body["chain"]["chainId"], CHAIN_ID);
    assert_eq!(body["database"]["markets"], 1);
    assert_eq!(body["database"]["participants"], 5);
}

#[tokio::test]
async fn attestations_round_trip_within_one_cycle() {
    let h = Harness::new(test_config()).await;

    let response = h
        .server
        .post("/api/attestations")
        .json(&h.attestation_body(0, 1, 1))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["signatureCount"], 1);
    assert_eq!(body["requiredSignatures"], 3);
    assert_eq!(body["enqueued"], false);

    // the row is visible in the same request/response cycle.
    let response = h
        .server
        .get("/api/attestations")
        .add_query_param("market", h.market_str())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["attestations"].as_array().unwrap().len(), 1);
    let signer = format!("{:?}", h.wallets[0].address());
    assert_eq!(body["attestations"][0]["signer"], signer);

    // counts track each submission.
    for i in 1..3 {
        h.server
            .post("/api/attestations")
            .json(&h.attestation_body(i, 1, 1))
            .await
            .assert_status_ok();
        let count: serde_json::Value = h
            .server
            .get(&format!("/api/attestations/{}/count", h.market_str()))
            .await
            .json();
        assert_eq!(count["yes"], (i + 1) as i64);
        assert_eq!(count["no"], 0);
    }

    // the third signature crossed ceil(5 * 60 / 100) = 3 and queued the
    // market for finalization.
    let queue: serde_json::Value =
        h.server.get("/health/queue").await.json();
    assert_eq!(queue["entries"].as_array().unwrap().len(), 1);
    assert_eq!(queue["entries"][0]["signatureCount"], 3);
}

#[tokio::test]
async fn duplicate_attestations_conflict() {
    let h = Harness::new(test_config()).await;
    h.server
        .post("/api/attestations")
        .json(&h.attestation_body(0, 1, 7))
        .await
        .assert_status_ok();

    let response = h
        .server
        .post("/api/attestations")
        .json(&h.attestation_body(0, 1, 7))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");

    // the count did not move.
    let count: serde_json::Value = h
        .server
        .get(&format!("/api/attestations/{}/count", h.market_str()))
        .await
        .json();
    assert_eq!(count["yes"], 1);
}

#[tokio::test]
async fn invalid_inputs_are_rejected_at_the_boundary() {
    let h = Harness::new(test_config()).await;

    // malformed address
    let response = h
        .server
        .post("/api/attestations")
        .json(&json!({
            "market": "0x123",
            "signer": format!("{:?}", h.wallets[0].address()),
            "outcome": "1",
            "nonce": "1",
            "signature": format!("0x{}", "11".repeat(65)),
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION");

    // malformed outcome
    let mut bad_outcome = h.attestation_body(0, 1, 1);
    bad_outcome["outcome"] = json!("2");
    let response =
        h.server.post("/api/attestations").json(&bad_outcome).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    // a signature that does not recover to the signer
    let mut forged = h.attestation_body(0, 1, 1);
    forged["signer"] = json!(format!("{:?}", h.wallets[1].address()));
    let response = h.server.post("/api/attestations").json(&forged).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "SIGNATURE_INVALID");
}

#[tokio::test]
async fn unknown_markets_are_not_found_after_a_oneshot_sync() {
    let h = Harness::new(test_config()).await;
    let unknown = Address::from_low_u64_be(0xdead);
    let wallet = &h.wallets[0];
    let digest =
        attestation_digest(CHAIN_ID, unknown, U256::one(), U256::one());
    let signature = wallet.sign_hash(digest).unwrap();

    let response = h
        .server
        .post("/api/attestations")
        .json(&json!({
            "market": format!("{unknown:?}"),
            "signer": format!("{:?}", wallet.address()),
            "outcome": "1",
            "nonce": "1",
            "signature": format!("0x{signature}"),
        }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn market_views_are_lowercase_and_case_insensitive() {
    let h = Harness::new(test_config()).await;
    // query with an upper-cased address
    let lower = h.market_str();
    let upper = format!("0x{}", lower[2..].to_uppercase());
    let response =
        h.server.get(&format!("/api/markets/{upper}")).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["address"], h.market_str());
    assert_eq!(body["thresholdPercent"], 60);
    assert_eq!(body["proposal"]["outcome"], 1);
    assert_eq!(body["attestations"]["yes"], 0);

    // list view carries the proposal summary.
    let response = h.server.get("/api/markets").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let markets = body["markets"].as_array().unwrap();
    assert_eq!(markets.len(), 1);
    assert_eq!(markets[0]["proposal"]["disputeUntil"], DISPUTE_UNTIL);

    // bad list parameters are validation failures.
    h.server
        .get("/api/markets")
        .add_query_param("limit", "200")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    h.server
        .get("/api/markets")
        .add_query_param("status", "9")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn participants_and_proposal_endpoints_serve_the_mirror() {
    let h = Harness::new(test_config()).await;
    let response = h
        .server
        .get(&format!("/api/markets/{}/participants", h.market_str()))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["participants"].as_array().unwrap().len(), 5);

    let response = h
        .server
        .get(&format!("/api/markets/{}/proposal", h.market_str()))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["proposal"]["outcome"], 1);
    assert_eq!(body["attestations"].as_array().unwrap().len(), 0);

    let response = h
        .server
        .get(&format!("/api/markets/{}/status", h.market_str()))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], 1);
    assert_eq!(body["proposal"]["isDisputed"], false);
}

#[tokio::test]
async fn predict_address_validates_and_delegates() {
    let h = Harness::new(test_config()).await;
    let token = format!("{:?}", Address::from_low_u64_be(0xaa));

    // thresholds outside 51..=99 are rejected.
    let response = h
        .server
        .post("/api/markets/predict-address")
        .json(&json!({
            "topic": "sidebet",
            "thresholdPercent": 50,
            "token": token,
            "minStake": "1000",
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let request = json!({
        "topic": "sidebet",
        "thresholdPercent": 60,
        "token": token,
        "minStake": "1000",
    });
    let first: serde_json::Value = h
        .server
        .post("/api/markets/predict-address")
        .json(&request)
        .await
        .json();
    let second: serde_json::Value = h
        .server
        .post("/api/markets/predict-address")
        .json(&request)
        .await
        .json();
    // deterministic derivation, lowercase address.
    assert_eq!(first["predictedAddress"], second["predictedAddress"]);
    let predicted = first["predictedAddress"].as_str().unwrap();
    assert!(predicted.starts_with("0x"));
    assert_eq!(predicted, predicted.to_lowercase());
}

#[tokio::test]
async fn sync_trigger_surfaces_chain_errors() {
    let h = Harness::new(test_config()).await;
    // known market syncs fine.
    h.server
        .post(&format!("/api/markets/{}/sync", h.market_str()))
        .await
        .assert_status_ok();
    // a market the chain does not know maps onto the chain taxonomy.
    let unknown = format!("{:?}", Address::from_low_u64_be(0xdead));
    let response = h
        .server
        .post(&format!("/api/markets/{unknown}/sync"))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "CHAIN_UNAVAILABLE");
}

#[tokio::test]
async fn attestation_deletion_is_development_only() {
    // development: allowed.
    let h = Harness::new(test_config()).await;
    h.server
        .post("/api/attestations")
        .json(&h.attestation_body(0, 1, 1))
        .await
        .assert_status_ok();
    let response = h
        .server
        .delete(&format!("/api/attestations/{}", h.market_str()))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["deleted"], 1);

    // production: forbidden.
    let mut config = test_config();
    config.environment = RuntimeEnvironment::Production;
    let h = Harness::new(config).await;
    let response = h
        .server
        .delete(&format!("/api/attestations/{}", h.market_str()))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn the_write_tier_is_rate_limited() {
    let mut config = test_config();
    config.write_rate_limit_max_requests = 2;
    let h = Harness::new(config).await;

    h.server
        .post("/api/attestations")
        .json(&h.attestation_body(0, 1, 1))
        .await
        .assert_status_ok();
    h.server
        .post("/api/attestations")
        .json(&h.attestation_body(1, 1, 1))
        .await
        .assert_status_ok();
    let response = h
        .server
        .post("/api/attestations")
        .json(&h.attestation_body(2, 1, 1))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");

    // reads stay on the default tier and keep working.
    h.server.get("/api/markets").await.assert_status_ok();
    // health is exempt entirely.
    h.server.get("/health").await.assert_status_ok();
}
