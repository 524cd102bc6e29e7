//! Search Console API client
//!
//! Single entry point for remote calls. Every call is resolved against the
//! endpoint registry, then each attempt takes a rate-limit slot, makes sure
//! the authenticated session exists and goes out over HTTP. Failed attempts
//! are classified and retried by the two-tier [`RetryOrchestrator`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use searchtap_common::resilience::{
    Clock, LimiterStats, SlidingWindowConfig, SlidingWindowLimiter, SystemClock,
};
use searchtap_domain::constants::READONLY_SCOPE;
use searchtap_domain::{ApiResponse, CallRequest, ClientConfig, Params};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::classifier;
use super::errors::{ApiError, ErrorKind};
use super::resolver::{Invocation, ResourceResolver};
use super::retry::RetryOrchestrator;
use crate::auth::CredentialManager;
use crate::http::{HttpClient, RawResponse};

/// Remote reporting operations consumed by the sync layer
#[async_trait]
pub trait ReportingApi: Send + Sync {
    /// Perform one logical call, retries included
    async fn call(&self, request: CallRequest) -> Result<ApiResponse, ApiError>;
}

/// Rate-limited, retrying client sharing one session across all callers
pub struct ApiClient {
    config: ClientConfig,
    credentials: CredentialManager,
    resolver: ResourceResolver,
    limiter: SlidingWindowLimiter<Arc<dyn Clock>>,
    retry: RetryOrchestrator,
    shutdown: CancellationToken,
    requests_sent: AtomicU64,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("has_session", &self.credentials.has_session())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client on the system clock with a private shutdown token
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Call `resource.method` with `params`
    ///
    /// # Errors
    ///
    /// - [`ApiError::UnknownMethod`] / [`ApiError::InvalidParameters`]
    ///   before any network traffic
    /// - [`ApiError::RetriesExhausted`] once a retry tier gives up
    /// - [`ApiError::Cancelled`] if [`shutdown`](Self::shutdown) interrupts
    ///   a wait
    /// - any other classified failure on first occurrence
    #[instrument(skip(self, params), fields(call = %format_args!("{resource}.{method}")))]
    pub async fn get(
        &self,
        method: &str,
        resource: &str,
        params: &Params,
    ) -> Result<ApiResponse, ApiError> {
        let invocation = self.resolver.resolve(resource, method, params)?;

        let attempts: BoxFuture<'_, Result<ApiResponse, ApiError>> =
            Box::pin(self.retry.run(|| self.attempt(&invocation)));
        let result = attempts.await;
        match &result {
            Ok(body) => debug!(keys = body.len(), "API call succeeded"),
            Err(err) => warn!(kind = %err.kind(), error = %err, "API call failed"),
        }
        result
    }

    /// Same as [`get`](Self::get), taking a prepared request
    pub async fn execute(&self, request: &CallRequest) -> Result<ApiResponse, ApiError> {
        self.get(&request.method, &request.resource, &request.params).await
    }

    /// Call and deserialize the response object into `T`
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        method: &str,
        resource: &str,
        params: &Params,
    ) -> Result<T, ApiError> {
        let body = self.get(method, resource, params).await?;
        serde_json::from_value(Value::Object(body))
            .map_err(|e| ApiError::Decode(format!("{resource}.{method}: {e}")))
    }

    /// Interrupt every pending and future wait of this client
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down API client");
            self.shutdown.cancel();
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn limiter_stats(&self) -> LimiterStats {
        self.limiter.stats()
    }

    /// HTTP requests sent to the API, retries and replays included
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// One remote attempt, with a single replay after a rejected token
    async fn attempt(&self, invocation: &Invocation) -> Result<ApiResponse, ApiError> {
        self.acquire_slot().await?;
        let session = self.credentials.ensure_session().await?;
        let token = session.bearer_token().await?;

        let response = self.send(invocation, &token).await?;
        let error = match classifier::error_for_response(&response) {
            None => return parse_body(&response),
            Some(error) => error,
        };
        if error.kind() != ErrorKind::Unauthorized {
            return Err(error);
        }

        warn!(call = %invocation, "Access token rejected, refreshing once");
        let fresh = session.force_refresh(&token).await?;
        self.acquire_slot().await?;
        let replay = self.send(invocation, &fresh).await?;
        match classifier::error_for_response(&replay) {
            None => parse_body(&replay),
            Some(error) => Err(error),
        }
    }

    async fn acquire_slot(&self) -> Result<(), ApiError> {
        self.limiter.acquire_until_cancelled(&self.shutdown).await.map_err(|_| ApiError::Cancelled)
    }

    async fn send(&self, invocation: &Invocation, bearer: &str) -> Result<RawResponse, ApiError> {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        let response = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(ApiError::Cancelled),
            response = self.resolver.execute(invocation, bearer) => response,
        };
        response.map_err(|e| classifier::error_for_transport(&e))
    }
}

#[async_trait]
impl ReportingApi for ApiClient {
    async fn call(&self, request: CallRequest) -> Result<ApiResponse, ApiError> {
        self.execute(&request).await
    }
}

/// Successful body as a JSON object; an empty body is an empty object
fn parse_body(response: &RawResponse) -> Result<ApiResponse, ApiError> {
    if response.body.trim().is_empty() {
        return Ok(ApiResponse::new());
    }
    match serde_json::from_str::<Value>(&response.body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::Decode(format!("expected a JSON object, got {other}"))),
        Err(e) => Err(ApiError::Decode(e.to_string())),
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<ClientConfig>,
    clock: Option<Arc<dyn Clock>>,
    shutdown: Option<CancellationToken>,
    scopes: Option<Vec<String>>,
}

impl ApiClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Clock used by the limiter, every retry wait and token expiry
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share a shutdown token with other components
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Override the read-only scope requested for the session
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Build the client
    ///
    /// No network traffic happens here; the session is built on first call.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] when the configuration is missing or
    /// invalid, [`ApiError::Credential`] when the key document is malformed.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config.ok_or_else(|| ApiError::Config("client config not set".into()))?;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let shutdown = self.shutdown.unwrap_or_default();
        let scopes = self.scopes.unwrap_or_else(|| vec![READONLY_SCOPE.to_string()]);

        let http = HttpClient::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        let credentials = CredentialManager::new(
            config.credentials_json.clone(),
            config.email.clone(),
            scopes,
            http.clone(),
            clock.clone(),
            shutdown.clone(),
        );
        credentials.check_key()?;

        let resolver = ResourceResolver::new(http, &config.base_url)?;

        let window = SlidingWindowConfig::builder()
            .max_calls(config.rate_limit.max_calls)
            .window(config.rate_limit.window())
            .build()
            .map_err(ApiError::Config)?;
        let limiter = SlidingWindowLimiter::with_clock(window, clock.clone()).map_err(ApiError::Config)?;

        let retry = RetryOrchestrator::from_settings(
            &config.quota_retry,
            &config.transient_retry,
            clock,
            shutdown.clone(),
        )?;

        debug!(base_url = %config.base_url, subject = %config.email, "API client ready");
        Ok(ApiClient {
            config,
            credentials,
            resolver,
            limiter,
            retry,
            shutdown,
            requests_sent: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use searchtap_common::resilience::MockClock;

    use super::*;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse { status, body: body.to_string() }
    }

    #[test]
    fn empty_body_is_empty_object() {
        assert!(parse_body(&raw(200, "")).unwrap().is_empty());
        assert!(parse_body(&raw(204, "  \n")).unwrap().is_empty());
    }

    #[test]
    fn object_body_is_returned() {
        let body = parse_body(&raw(200, r#"{"siteEntry":[{"siteUrl":"https://a.test/"}]}"#)).unwrap();
        assert_eq!(body["siteEntry"][0]["siteUrl"], "https://a.test/");
    }

    #[test]
    fn non_object_body_is_decode_error() {
        assert!(matches!(parse_body(&raw(200, "[1,2]")), Err(ApiError::Decode(_))));
        assert!(matches!(parse_body(&raw(200, "<html>")), Err(ApiError::Decode(_))));
    }

    #[test]
    fn builder_requires_config() {
        let err = ApiClient::builder().build().unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let config = ClientConfig::new("{}", "not-an-address");
        assert!(matches!(ApiClient::new(config), Err(ApiError::Config(_))));
    }

    #[test]
    fn builder_rejects_malformed_key() {
        let config = ClientConfig::new(r#"{"type":"authorized_user"}"#, "admin@example.com");
        let err = ApiClient::builder()
            .config(config)
            .clock(Arc::new(MockClock::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ApiError::Credential(_)));
    }
}
