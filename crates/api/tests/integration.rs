//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server.
//! Chain access is replaced by an in-memory client, so no RPC node is needed.
//!
//! ```bash
//! cargo test -p gatekeeper-api --test integration
//! ```

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use gatekeeper_api::routes::{MAX_BODY_BYTES, create_router};
use gatekeeper_api::state::AppState;
use gatekeeper_auth::chain::{SimulatedCall, SimulatedCallResult};
use gatekeeper_auth::{ChainClient, ChainError, NonceAuthority};
use gatekeeper_common::config::AppConfig;

// ============================================================
// Helpers
// ============================================================

/// Chain where every address is an EOA. `fail` simulates an unreachable node.
#[derive(Clone, Default)]
struct EoaOnlyChain {
    fail: bool,
}

impl ChainClient for EoaOnlyChain {
    async fn code_at(&self, _address: Address) -> Result<Bytes, ChainError> {
        if self.fail {
            return Err(ChainError::Rpc("connection refused".to_string()));
        }
        Ok(Bytes::new())
    }

    async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes, ChainError> {
        Err(ChainError::Reverted("no code".to_string()))
    }

    async fn deploy_call(&self, _init_code: Bytes) -> Result<Bytes, ChainError> {
        Err(ChainError::Reverted("no code".to_string()))
    }

    async fn simulate(
        &self,
        _calls: Vec<SimulatedCall>,
    ) -> Result<Vec<SimulatedCallResult>, ChainError> {
        Err(ChainError::Rpc("unsupported".to_string()))
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        rpc_url: "http://unused".to_string(),
        nonce_sweep_interval_secs: 0,
        ..AppConfig::default()
    }
}

fn build_test_state(chain: EoaOnlyChain) -> AppState<EoaOnlyChain> {
    AppState::new(Arc::new(NonceAuthority::default()), chain, test_config())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn fetch_nonce(app: Router) -> String {
    let (status, json) = send(app, get("/challenge")).await;
    assert_eq!(status, StatusCode::OK);
    json["nonce"].as_str().unwrap().to_string()
}

fn signed_body(signer: &PrivateKeySigner, address: Address, message: &str) -> serde_json::Value {
    let sig = signer.sign_message_sync(message.as_bytes()).unwrap();
    serde_json::json!({
        "address": address.to_string(),
        "message": message,
        "signature": format!("0x{}", hex::encode(sig.as_bytes())),
    })
}

// ============================================================
// Route tests
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_router(build_test_state(EoaOnlyChain::default()));

    let (status, json) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "gatekeeper-api");
    assert_eq!(json["outstanding_nonces"], 0);
    assert_eq!(json["nonce_epoch"], 0);
}

#[tokio::test]
async fn test_health_reports_epoch_after_clear() {
    let state = build_test_state(EoaOnlyChain::default());
    fetch_nonce(create_router(state.clone())).await;
    state.nonces().clear();

    let (status, json) = send(create_router(state), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outstanding_nonces"], 0);
    assert_eq!(json["nonce_epoch"], 1);
}

#[tokio::test]
async fn test_challenge_issues_hex_nonce() {
    let state = build_test_state(EoaOnlyChain::default());

    let nonce = fetch_nonce(create_router(state.clone())).await;
    assert_eq!(nonce.len(), 32);
    assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(state.nonces().contains(&nonce));

    let second = fetch_nonce(create_router(state.clone())).await;
    assert_ne!(nonce, second);
    assert_eq!(state.nonces().size(), 2);
}

#[tokio::test]
async fn test_legacy_nonce_path() {
    let app = create_router(build_test_state(EoaOnlyChain::default()));
    let (status, json) = send(app, get("/api/auth/nonce")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["nonce"].is_string());
}

#[tokio::test]
async fn test_verify_success_then_replay_rejected() {
    let state = build_test_state(EoaOnlyChain::default());
    let signer = PrivateKeySigner::random();

    let nonce = fetch_nonce(create_router(state.clone())).await;
    let message = format!("Sign in to App\nNonce: {}", nonce);
    let body = signed_body(&signer, signer.address(), &message);

    let (status, json) = send(create_router(state.clone()), post_json("/verify", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["address"], signer.address().to_string());
    assert_eq!(json["message"], "Authentication successful");
    let ts = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());

    let (status, json) = send(create_router(state.clone()), post_json("/verify", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid or reused nonce");
}

#[tokio::test]
async fn test_verify_via_legacy_path() {
    let state = build_test_state(EoaOnlyChain::default());
    let signer = PrivateKeySigner::random();

    let nonce = fetch_nonce(create_router(state.clone())).await;
    let body = signed_body(&signer, signer.address(), &format!("Sign in at {}", nonce));

    let (status, json) = send(create_router(state), post_json("/api/auth/verify", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_verify_wrong_key_is_unauthorized() {
    let state = build_test_state(EoaOnlyChain::default());
    let claimed = PrivateKeySigner::random();
    let attacker = PrivateKeySigner::random();

    let nonce = fetch_nonce(create_router(state.clone())).await;
    let message = format!("Sign in to App\nNonce: {}", nonce);
    let body = signed_body(&attacker, claimed.address(), &message);

    let (status, json) = send(create_router(state.clone()), post_json("/verify", &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Invalid signature");
    assert!(!state.nonces().contains(&nonce));
}

#[tokio::test]
async fn test_verify_missing_fields() {
    let app = create_router(build_test_state(EoaOnlyChain::default()));
    let body = serde_json::json!({ "address": "0x0000000000000000000000000000000000000001" });

    let (status, json) = send(app, post_json("/verify", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "Missing required fields: address, message, signature"
    );
}

#[tokio::test]
async fn test_verify_invalid_json_body() {
    let app = create_router(build_test_state(EoaOnlyChain::default()));
    let request = Request::builder()
        .method("POST")
        .uri("/verify")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_verify_message_without_nonce() {
    let app = create_router(build_test_state(EoaOnlyChain::default()));
    let signer = PrivateKeySigner::random();
    let body = signed_body(&signer, signer.address(), "Sign in to App");

    let (status, json) = send(app, post_json("/verify", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid message format - nonce not found");
}

#[tokio::test]
async fn test_concurrent_replay_single_success() {
    let state = build_test_state(EoaOnlyChain::default());
    let signer = PrivateKeySigner::random();

    let nonce = fetch_nonce(create_router(state.clone())).await;
    let message = format!("Sign in to App\nNonce: {}", nonce);
    let body = signed_body(&signer, signer.address(), &message);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let app = create_router(state.clone());
            let request = post_json("/verify", &body);
            tokio::spawn(async move { send(app, request).await.0 })
        })
        .collect();

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::BAD_REQUEST => rejected += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(rejected, 15);
}

#[tokio::test]
async fn test_verify_oversized_body_rejected() {
    let app = create_router(build_test_state(EoaOnlyChain::default()));
    let body = serde_json::to_string(&serde_json::json!({
        "address": "0x0000000000000000000000000000000000000001",
        "message": "x".repeat(MAX_BODY_BYTES),
        "signature": "0x00",
    }))
    .unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/verify")
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_verify_oversized_streamed_body_rejected() {
    let app = create_router(build_test_state(EoaOnlyChain::default()));
    let body = format!(
        r#"{{"address":"0x01","message":"{}","signature":"0x00"}}"#,
        "x".repeat(MAX_BODY_BYTES)
    );
    let request = Request::builder()
        .method("POST")
        .uri("/verify")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_backend_failure_is_opaque_500() {
    let state = build_test_state(EoaOnlyChain { fail: true });

    let nonce = fetch_nonce(create_router(state.clone())).await;
    let body = serde_json::json!({
        "address": "0x00000000000000000000000000000000000000aa",
        "message": format!("Sign in to App\nNonce: {}", nonce),
        "signature": format!("0x{}", "01".repeat(100)),
    });

    let (status, json) = send(create_router(state), post_json("/verify", &body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Internal server error");
}
