//! Shared fixtures for the infra integration tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use searchtap_common::resilience::{Clock, MockClock};
use searchtap_domain::ClientConfig;
use searchtap_infra::ApiClient;
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY: &str = include_str!("fixtures/test_key.pem");
pub const SUBJECT: &str = "admin@example.com";
pub const TOKEN_PATH: &str = "/token";
pub const SITES_PATH: &str = "/webmasters/v3/sites";

/// Service-account key whose token endpoint lives on `server`
pub fn key_json(server: &MockServer) -> String {
    json!({
        "type": "service_account",
        "project_id": "tap-project",
        "private_key_id": "kid-1",
        "private_key": TEST_KEY,
        "client_email": "tap@tap-project.iam.gserviceaccount.com",
        "token_uri": format!("{}{TOKEN_PATH}", server.uri())
    })
    .to_string()
}

/// Client config pointing both the API and the token endpoint at `server`
///
/// Jitter is off so that recorded waits are exact.
pub fn test_config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::new(key_json(server), SUBJECT).with_base_url(server.uri());
    config.transient_retry.jitter = false;
    config
}

pub fn client_with(config: ClientConfig, clock: Arc<dyn Clock>) -> ApiClient {
    ApiClient::builder().config(config).clock(clock).build().expect("client should build")
}

pub fn mock_client(server: &MockServer, clock: &MockClock) -> ApiClient {
    client_with(test_config(server), Arc::new(clock.clone()))
}

pub fn token_body(token: &str) -> serde_json::Value {
    json!({"access_token": token, "expires_in": 3600, "token_type": "Bearer"})
}

/// Token endpoint that always issues `token`
pub async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
        .mount(server)
        .await;
}

/// Number of requests `server` saw on `request_path`
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

/// Clock whose sleeps never finish
///
/// Each sleep is recorded and signals `sleeping`, so a test knows a wait
/// has started and can interrupt it.
#[derive(Clone)]
pub struct StalledClock {
    start: Instant,
    requested: Arc<Mutex<Vec<Duration>>>,
    pub sleeping: Arc<Notify>,
}

impl StalledClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            requested: Arc::new(Mutex::new(Vec::new())),
            sleeping: Arc::new(Notify::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for StalledClock {
    fn now(&self) -> Instant {
        self.start
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        self.requested.lock().unwrap().push(duration);
        self.sleeping.notify_one();
        std::future::pending::<()>().await;
    }
}

/// Cancel `token` as soon as `clock` starts its first wait
pub async fn cancel_on_first_wait(clock: &StalledClock, token: CancellationToken) {
    clock.sleeping.notified().await;
    token.cancel();
}
