//! Client configuration
//!
//! Only `credentials_json` and `email` are required; everything else falls
//! back to the published limits of the remote API.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT, QUOTA_MAX_ATTEMPTS,
    QUOTA_WAIT_SECS, RATE_LIMIT_MAX_CALLS, RATE_LIMIT_WINDOW_SECS, TRANSIENT_BACKOFF_FACTOR,
    TRANSIENT_INITIAL_DELAY_MS, TRANSIENT_MAX_ATTEMPTS, TRANSIENT_MAX_DELAY_SECS,
};
use crate::errors::{Result, TapError};

/// Configuration for one API client
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service-account key as the raw JSON document
    pub credentials_json: String,

    /// Subject the service account impersonates
    pub email: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub quota_retry: QuotaRetrySettings,

    #[serde(default)]
    pub transient_retry: TransientRetrySettings,
}

// Keeps the private key out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("credentials_json", &"<redacted>")
            .field("email", &self.email)
            .field("user_agent", &self.user_agent)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("rate_limit", &self.rate_limit)
            .field("quota_retry", &self.quota_retry)
            .field("transient_retry", &self.transient_retry)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with default limits for the given credentials
    pub fn new(credentials_json: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            credentials_json: credentials_json.into(),
            email: email.into(),
            user_agent: default_user_agent(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            rate_limit: RateLimitSettings::default(),
            quota_retry: QuotaRetrySettings::default(),
            transient_retry: TransientRetrySettings::default(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.credentials_json.trim().is_empty() {
            return Err(TapError::Config("credentials_json must not be empty".into()));
        }
        if !self.email.contains('@') {
            return Err(TapError::Config(format!(
                "email must be an account address, got '{}'",
                self.email
            )));
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(TapError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(TapError::Config("request_timeout_secs must be greater than 0".into()));
        }
        self.rate_limit.validate()?;
        self.quota_retry.validate()?;
        self.transient_retry.validate()
    }
}

/// Sliding-window call budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { max_calls: RATE_LIMIT_MAX_CALLS, window_secs: RATE_LIMIT_WINDOW_SECS }
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_calls == 0 || self.window_secs == 0 {
            return Err(TapError::Config("rate_limit needs max_calls > 0 and window_secs > 0".into()));
        }
        Ok(())
    }
}

/// Outer retry tier for quota exhaustion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaRetrySettings {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed pause before retrying a quota failure
    pub wait_secs: u64,
}

impl Default for QuotaRetrySettings {
    fn default() -> Self {
        Self { max_attempts: QUOTA_MAX_ATTEMPTS, wait_secs: QUOTA_WAIT_SECS }
    }
}

impl QuotaRetrySettings {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TapError::Config("quota_retry.max_attempts must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Inner retry tier for server errors, throttling and dropped connections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientRetrySettings {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait before the first retry
    pub initial_delay_ms: u64,
    /// Growth factor between consecutive waits
    pub factor: f64,
    /// Upper bound for a single wait
    pub max_delay_secs: u64,
    /// Randomise each wait between zero and the computed delay
    pub jitter: bool,
}

impl Default for TransientRetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: TRANSIENT_MAX_ATTEMPTS,
            initial_delay_ms: TRANSIENT_INITIAL_DELAY_MS,
            factor: TRANSIENT_BACKOFF_FACTOR,
            max_delay_secs: TRANSIENT_MAX_DELAY_SECS,
            jitter: true,
        }
    }
}

impl TransientRetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TapError::Config(
                "transient_retry.max_attempts must be greater than 0".into(),
            ));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(TapError::Config(format!(
                "transient_retry.factor must be >= 1, got {}",
                self.factor
            )));
        }
        Ok(())
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
