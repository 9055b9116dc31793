//! SMS API integration tests
//!
//! Drives /inbound/sms and /outbound/sms end to end against a server backed
//! by the in-memory stores.
//!
//! Run with: cargo test --test admission_api

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use smsgate::bootstrap::{Server, Shutdown};
use smsgate::config::Config;

/// Port allocator for tests
static PORT: AtomicU16 = AtomicU16::new(19300);

fn next_port() -> u16 {
    PORT.fetch_add(1, Ordering::SeqCst)
}

const USER: &str = "azr1";
const AUTH_ID: &str = "20S0KPNOIM";
const OWNED_A: &str = "4924195509198";
const OWNED_B: &str = "4924195509029";
const FOREIGN: &str = "4924195509012";

#[derive(Debug, Deserialize, PartialEq)]
struct SmsResponse {
    message: String,
    error: String,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    inbound: DirectionStats,
    outbound: DirectionStats,
    auth_failures: u64,
}

#[derive(Debug, Deserialize)]
struct DirectionStats {
    accepted: u64,
    rejected: u64,
    failed: u64,
}

/// Test fixture that runs the full server on unique ports
struct TestServer {
    handle: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
    shutdown: Arc<Shutdown>,
    api_url: String,
    admin_url: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with_policy("").await
    }

    async fn start_with_policy(policy: &str) -> Self {
        let api_port = next_port();
        let admin_port = next_port();

        let yaml = format!(
            r#"
api:
  address: "127.0.0.1:{api_port}"
admin:
  address: "127.0.0.1:{admin_port}"
accounts:
  backend: memory
  static_accounts:
    - username: {USER}
      auth_id: {AUTH_ID}
      numbers: ["{OWNED_A}", "{OWNED_B}"]
    - username: plivo2
      auth_id: 54P2EOKQ47
      numbers: ["{FOREIGN}"]
{policy}
"#
        );
        let config = Config::from_yaml(&yaml).expect("config");

        let server = Server::new(config).expect("server");
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(server.run());

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(200)).await;

        Self {
            handle: Some(handle),
            shutdown,
            api_url: format!("http://127.0.0.1:{}", api_port),
            admin_url: format!("http://127.0.0.1:{}", admin_port),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, SmsResponse) {
        let resp = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .basic_auth(USER, Some(AUTH_ID))
            .json(&body)
            .send()
            .await
            .expect("request failed");
        let status = resp.status();
        (status, resp.json().await.expect("invalid json"))
    }

    async fn stats(&self) -> StatsResponse {
        self.client
            .get(format!("{}/stats", self.admin_url))
            .send()
            .await
            .expect("request failed")
            .json()
            .await
            .expect("invalid json")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn sms(from: &str, to: &str, text: &str) -> Value {
    json!({ "from": from, "to": to, "text": text })
}

#[tokio::test]
async fn test_inbound_ok() {
    let server = TestServer::start().await;

    let (status, body) = server.post("/inbound/sms", sms(FOREIGN, OWNED_A, "hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        SmsResponse {
            message: "inbound sms ok".into(),
            error: String::new(),
        }
    );
}

#[tokio::test]
async fn test_outbound_ok() {
    let server = TestServer::start().await;

    let (status, body) = server.post("/outbound/sms", sms(OWNED_A, FOREIGN, "hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.message, "outbound sms ok");
    assert!(body.error.is_empty());
}

#[tokio::test]
async fn test_stop_blocks_reverse_outbound() {
    let server = TestServer::start().await;

    // OWNED_A receives STOP from OWNED_B
    let (status, body) = server.post("/inbound/sms", sms(OWNED_B, OWNED_A, "STOP please")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.message, "inbound sms ok");

    let (status, body) = server.post("/outbound/sms", sms(OWNED_B, OWNED_A, "hi")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body.error,
        format!("sms from {} to {} blocked by STOP request", OWNED_B, OWNED_A)
    );
    assert!(body.message.is_empty());

    // Other direction unaffected
    let (status, _) = server.post("/outbound/sms", sms(OWNED_A, OWNED_B, "hi")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_non_string_field_is_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post(
            "/outbound/sms",
            json!({"from": OWNED_A, "to": 91, "text": "hello from India"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "to must be a `string` type, but the final value was: `91`");
}

#[tokio::test]
async fn test_field_bounds() {
    let server = TestServer::start().await;

    let (status, body) = server.post("/inbound/sms", sms("12345", OWNED_A, "hi")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "from must be at least 6 characters");

    let long = "x".repeat(121);
    let (status, body) = server.post("/inbound/sms", sms(FOREIGN, OWNED_A, &long)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "text must be at most 120 characters");

    let (status, body) = server.post("/inbound/sms", json!({"from": FOREIGN, "to": OWNED_A})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "text is a required field");
}

#[tokio::test]
async fn test_unowned_numbers_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server.post("/inbound/sms", sms(OWNED_A, FOREIGN, "STOP")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "to parameter not found");

    let (status, body) = server.post("/outbound/sms", sms(FOREIGN, OWNED_A, "hi")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "from parameter not found");

    // The STOP on an unowned recipient was not recorded
    let (status, _) = server.post("/outbound/sms", sms(OWNED_A, FOREIGN, "hi")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit() {
    let server = TestServer::start_with_policy("policy:\n  rate_limit:\n    max_messages: 5\n").await;

    for _ in 0..5 {
        let (status, _) = server.post("/outbound/sms", sms(OWNED_A, FOREIGN, "hi")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = server.post("/outbound/sms", sms(OWNED_A, FOREIGN, "hi")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, format!("limit reached for from {}", OWNED_A));

    // Another sender of the same tenant has its own window
    let (status, _) = server.post("/outbound/sms", sms(OWNED_B, FOREIGN, "hi")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_default_limit_is_fifty() {
    let server = TestServer::start().await;

    for i in 1..=50 {
        let (status, _) = server.post("/outbound/sms", sms(OWNED_A, FOREIGN, "hi")).await;
        assert_eq!(status, StatusCode::OK, "message {}", i);
    }

    let (status, body) = server.post("/outbound/sms", sms(OWNED_A, FOREIGN, "hi")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, format!("limit reached for from {}", OWNED_A));
}

#[tokio::test]
async fn test_authentication_required() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(format!("{}/inbound/sms", server.api_url))
        .json(&sms(FOREIGN, OWNED_A, "hi"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: SmsResponse = resp.json().await.expect("invalid json");
    assert_eq!(body.error, "Basic Authentication required");

    // Valid username, wrong auth id
    let resp = server
        .client
        .post(format!("{}/inbound/sms", server.api_url))
        .basic_auth(USER, Some("54P2EOKQ47"))
        .json(&sms(FOREIGN, OWNED_A, "hi"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert_eq!(server.stats().await.auth_failures, 2);
}

#[tokio::test]
async fn test_method_not_allowed() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(format!("{}/inbound/sms", server.api_url))
        .basic_auth(USER, Some(AUTH_ID))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: SmsResponse = resp.json().await.expect("invalid json");
    assert_eq!(body.error, "Method Not Allowed");

    let resp = server
        .client
        .post(format!("{}/unknown", server.api_url))
        .basic_auth(USER, Some(AUTH_ID))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_malformed_body() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(format!("{}/outbound/sms", server.api_url))
        .basic_auth(USER, Some(AUTH_ID))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: SmsResponse = resp.json().await.expect("invalid json");
    assert!(body.error.starts_with("request body must be a JSON object"));
}

#[tokio::test]
async fn test_stats_count_decisions() {
    let server = TestServer::start().await;

    server.post("/inbound/sms", sms(FOREIGN, OWNED_A, "hello")).await;
    server.post("/inbound/sms", sms(OWNED_A, FOREIGN, "hello")).await;
    server.post("/outbound/sms", sms(OWNED_A, FOREIGN, "hello")).await;

    let stats = server.stats().await;
    assert_eq!(stats.inbound.accepted, 1);
    assert_eq!(stats.inbound.rejected, 1);
    assert_eq!(stats.outbound.accepted, 1);
    assert_eq!(stats.outbound.failed, 0);
}

#[tokio::test]
async fn test_ready_with_memory_stores() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(format!("{}/readyz", server.admin_url))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let mut server = TestServer::start().await;

    server.shutdown.start_drain();
    let handle = server.handle.take().expect("handle");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .expect("server task panicked")
        .expect("server returned error");

    // Listener is closed
    let result = server
        .client
        .post(format!("{}/inbound/sms", server.api_url))
        .basic_auth(USER, Some(AUTH_ID))
        .json(&sms(FOREIGN, OWNED_A, "hi"))
        .send()
        .await;
    assert!(result.is_err());
}
