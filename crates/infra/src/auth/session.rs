//! Authenticated session and the credential manager that builds it.
//!
//! A [`Session`] owns the current access token and renews it by exchanging
//! a freshly signed assertion at the token endpoint. The
//! [`CredentialManager`] builds at most one session per client, even when
//! many callers race on first use.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Method;
use searchtap_common::resilience::policies::PredicateRetry;
use searchtap_common::resilience::{Clock, RetryConfig, RetryError, RetryExecutor};
use searchtap_domain::constants::{
    ASSERTION_LIFETIME_SECS, JWT_BEARER_GRANT, TOKEN_REFRESH_THRESHOLD_SECS,
};
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::credentials::{DelegatedCredential, ServiceAccountKey};
use crate::api::classifier;
use crate::api::errors::ApiError;
use crate::http::HttpClient;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Bearer token with its expiry on the monotonic clock
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
    expires_at_utc: DateTime<Utc>,
}

impl AccessToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Wall-clock expiry, for diagnostics
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        self.expires_at_utc
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.saturating_duration_since(now)
            > Duration::from_secs(TOKEN_REFRESH_THRESHOLD_SECS)
    }
}

type ExchangePolicy = PredicateRetry<fn(&ApiError) -> bool>;

/// Performs the assertion-for-token exchange with a short retry of its own
pub struct TokenExchanger {
    http: HttpClient,
    credential: DelegatedCredential,
    clock: Arc<dyn Clock>,
    retry: RetryExecutor<ExchangePolicy, Arc<dyn Clock>>,
    exchanges: AtomicU64,
}

impl TokenExchanger {
    pub fn new(
        http: HttpClient,
        credential: DelegatedCredential,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        let config = RetryConfig::builder()
            .max_attempts(3)
            .exponential_backoff(Duration::from_millis(250), 2.0, Duration::from_secs(2))
            .equal_jitter()
            .build()
            .unwrap_or_default();
        let policy: ExchangePolicy = PredicateRetry::new(ApiError::is_transient as fn(&ApiError) -> bool);
        let retry = RetryExecutor::new(config, policy).with_clock(clock.clone()).with_shutdown(shutdown);

        Self { http, credential, clock, retry, exchanges: AtomicU64::new(0) }
    }

    /// Number of token-endpoint round trips made so far
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// Obtain a new access token
    ///
    /// Rejections by the identity provider surface as
    /// [`ApiError::Credential`]; transient failures that outlast the short
    /// retry surface as themselves.
    #[instrument(skip(self), fields(subject = %self.credential.subject()))]
    pub async fn exchange(&self) -> Result<AccessToken, ApiError> {
        let subject = self.credential.subject();
        self.retry.execute(|| self.exchange_once()).await.map_err(|err| match err {
            RetryError::NonRetryable { error: error @ ApiError::Credential(_), .. } => error,
            RetryError::NonRetryable { error, .. } => {
                warn!(error = %error, "Token endpoint rejected assertion");
                ApiError::Credential(format!("token exchange for '{subject}' rejected: {error}"))
            }
            RetryError::AttemptsExhausted { last_error, .. }
            | RetryError::TimeoutExceeded { last_error, .. } => last_error,
            RetryError::Cancelled { .. } => ApiError::Cancelled,
        })
    }

    async fn exchange_once(&self) -> Result<AccessToken, ApiError> {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        let assertion = self.credential.assertion(self.clock.unix_seconds())?;
        let request = self
            .http
            .request(Method::POST, self.credential.token_uri())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())]);

        let response =
            self.http.send(request).await.map_err(|e| classifier::error_for_transport(&e))?;
        if let Some(error) = classifier::error_for_response(&response) {
            return Err(error);
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Credential(format!("malformed token response: {e}")))?;
        if parsed.token_type.as_deref().is_some_and(|t| !t.eq_ignore_ascii_case("bearer")) {
            return Err(ApiError::Credential(format!(
                "unsupported token type '{}'",
                parsed.token_type.unwrap_or_default()
            )));
        }

        // Tokens are never trusted beyond the assertion lifetime
        let lifetime = Duration::from_secs(
            parsed.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS).min(ASSERTION_LIFETIME_SECS),
        );
        let expires_at_utc = DateTime::<Utc>::from(self.clock.system_time() + lifetime);
        debug!(expires_at = %expires_at_utc.to_rfc3339(), "Obtained access token");
        Ok(AccessToken {
            value: parsed.access_token,
            expires_at: self.clock.now() + lifetime,
            expires_at_utc,
        })
    }
}

/// Live authenticated handle shared by every call of one client
pub struct Session {
    exchanger: TokenExchanger,
    token: RwLock<AccessToken>,
    refresh_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    refreshes: AtomicU64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("subject", &self.subject())
            .field("refreshes", &self.refreshes())
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Perform the initial exchange and wrap the result
    pub async fn establish(exchanger: TokenExchanger, clock: Arc<dyn Clock>) -> Result<Self, ApiError> {
        let token = exchanger.exchange().await?;
        Ok(Self {
            exchanger,
            token: RwLock::new(token),
            refresh_lock: Mutex::new(()),
            clock,
            refreshes: AtomicU64::new(0),
        })
    }

    pub fn subject(&self) -> &str {
        self.exchanger.credential.subject()
    }

    /// Current bearer token, renewed first if it is about to expire
    pub async fn bearer_token(&self) -> Result<String, ApiError> {
        {
            let token = self.token.read().await;
            if token.is_fresh(self.clock.now()) {
                return Ok(token.value.clone());
            }
        }
        self.refresh(None).await
    }

    /// Renew after the remote API rejected `rejected`
    ///
    /// If another caller already replaced that token, its replacement is
    /// returned without a second exchange.
    pub async fn force_refresh(&self, rejected: &str) -> Result<String, ApiError> {
        self.refresh(Some(rejected)).await
    }

    /// Number of renewals after the initial exchange
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Token-endpoint round trips, including retries
    pub fn exchanges(&self) -> u64 {
        self.exchanger.exchanges()
    }

    async fn refresh(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        {
            let token = self.token.read().await;
            let superseded = rejected.is_some_and(|r| r != token.value);
            if superseded || (rejected.is_none() && token.is_fresh(self.clock.now())) {
                return Ok(token.value.clone());
            }
        }

        debug!(forced = rejected.is_some(), "Refreshing access token");
        let fresh = self.exchanger.exchange().await?;
        let value = fresh.value.clone();
        *self.token.write().await = fresh;
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }
}

/// Builds and caches the client's single [`Session`]
pub struct CredentialManager {
    credentials_json: String,
    subject: String,
    scopes: Vec<String>,
    http: HttpClient,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    session: OnceCell<Arc<Session>>,
    sessions_built: AtomicUsize,
}

impl CredentialManager {
    pub fn new(
        credentials_json: impl Into<String>,
        subject: impl Into<String>,
        scopes: Vec<String>,
        http: HttpClient,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            credentials_json: credentials_json.into(),
            subject: subject.into(),
            scopes,
            http,
            clock,
            shutdown,
            session: OnceCell::new(),
            sessions_built: AtomicUsize::new(0),
        }
    }

    /// Return the session, building it on first use
    ///
    /// Concurrent first callers wait for a single construction. A failed
    /// construction leaves nothing cached, so the next call tries again.
    pub async fn ensure_session(&self) -> Result<Arc<Session>, ApiError> {
        self.session.get_or_try_init(|| self.build_session()).await.cloned()
    }

    /// Validate the key document without contacting the identity provider
    pub fn check_key(&self) -> Result<(), ApiError> {
        let key = ServiceAccountKey::from_json(&self.credentials_json)?;
        DelegatedCredential::new(key, self.subject.clone(), self.scopes.clone()).map(|_| ())
    }

    pub fn has_session(&self) -> bool {
        self.session.initialized()
    }

    /// Number of sessions constructed so far (0 or 1)
    pub fn sessions_built(&self) -> usize {
        self.sessions_built.load(Ordering::SeqCst)
    }

    fn build_session(&self) -> BoxFuture<'_, Result<Arc<Session>, ApiError>> {
        Box::pin(async move {
            let key = ServiceAccountKey::from_json(&self.credentials_json)?;
            let credential =
                DelegatedCredential::new(key, self.subject.clone(), self.scopes.clone())?;
            let exchanger = TokenExchanger::new(
                self.http.clone(),
                credential,
                self.clock.clone(),
                self.shutdown.clone(),
            );

            let session = Session::establish(exchanger, self.clock.clone()).await?;
            self.sessions_built.fetch_add(1, Ordering::SeqCst);
            info!(subject = %self.subject, "Authenticated session established");
            Ok(Arc::new(session))
        })
    }
}
