//! API-specific error types
//!
//! Every failure a call can end with is an [`ApiError`]; every `ApiError`
//! maps onto exactly one [`ErrorKind`] of the closed taxonomy the retry
//! policies reason about.

use std::fmt;
use std::time::Duration;

use searchtap_common::error::{ErrorClassification, ErrorSeverity};
use searchtap_domain::constants::QUOTA_WAIT_SECS;
use searchtap_domain::TapError;
use thiserror::Error;

/// Google `errors[].reason` values that mean a quota, not a burst limit
const QUOTA_REASONS: [&str; 2] = ["dailyLimitExceeded", "quotaExceeded"];

/// Closed classification of remote failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    PaymentRequired,
    /// Quota exceeded (403)
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Conflict,
    Gone,
    PreconditionFailed,
    PayloadTooLarge,
    RangeNotSatisfiable,
    ExpectationFailed,
    UnprocessableEntity,
    PreconditionRequired,
    /// Any 5xx
    ServerError,
    /// 429
    RateLimited,
    /// No HTTP response was obtained
    ConnectionFailure,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [Self; 18] = [
        Self::BadRequest,
        Self::Unauthorized,
        Self::PaymentRequired,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotAllowed,
        Self::Conflict,
        Self::Gone,
        Self::PreconditionFailed,
        Self::PayloadTooLarge,
        Self::RangeNotSatisfiable,
        Self::ExpectationFailed,
        Self::UnprocessableEntity,
        Self::PreconditionRequired,
        Self::ServerError,
        Self::RateLimited,
        Self::ConnectionFailure,
        Self::Unknown,
    ];

    /// Kinds the inner (fast) retry loop handles
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ServerError | Self::ConnectionFailure | Self::RateLimited)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::PaymentRequired => "payment_required",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Conflict => "conflict",
            Self::Gone => "gone",
            Self::PreconditionFailed => "precondition_failed",
            Self::PayloadTooLarge => "payload_too_large",
            Self::RangeNotSatisfiable => "range_not_satisfiable",
            Self::ExpectationFailed => "expectation_failed",
            Self::UnprocessableEntity => "unprocessable_entity",
            Self::PreconditionRequired => "precondition_required",
            Self::ServerError => "server_error",
            Self::RateLimited => "rate_limited",
            Self::ConnectionFailure => "connection_failure",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the remote side (or the transport) told us about a failure
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteFailure {
    /// HTTP status line, absent for transport failures
    pub status: Option<u16>,
    /// Error code embedded in the JSON body, if any
    pub code: Option<u16>,
    pub message: String,
    /// First `errors[].reason` (or `error.status`) from the body
    pub reason: Option<String>,
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code) {
            (Some(status), Some(code)) if status != code => {
                write!(f, "HTTP {status} (code {code})")?;
            }
            (Some(status), _) => write!(f, "HTTP {status}")?,
            (None, Some(code)) => write!(f, "code {code}")?,
            (None, None) => f.write_str("no response")?,
        }
        if let Some(reason) = &self.reason {
            write!(f, " [{reason}]")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Which retry tier gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Quota,
    Transient,
}

impl fmt::Display for RetryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quota => f.write_str("quota"),
            Self::Transient => f.write_str("transient"),
        }
    }
}

/// API operation errors
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Classified failure of the remote call
    #[error("{kind}: {failure}")]
    Remote { kind: ErrorKind, failure: RemoteFailure },

    /// Credential blob unusable or rejected by the identity provider
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Unknown method '{resource}.{method}'")]
    UnknownMethod { resource: String, method: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{phase} retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted { phase: RetryPhase, attempts: u32, source: Box<ApiError> },

    #[error("Operation cancelled by shutdown")]
    Cancelled,
}

impl ApiError {
    pub fn remote(kind: ErrorKind, failure: RemoteFailure) -> Self {
        Self::Remote { kind, failure }
    }

    /// Taxonomy kind of this error
    ///
    /// Local failures are folded into the nearest remote kind so callers can
    /// match on one enum.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote { kind, .. } => *kind,
            Self::Credential(_) => ErrorKind::Unauthorized,
            Self::UnknownMethod { .. } | Self::InvalidParameters(_) | Self::Config(_) => {
                ErrorKind::BadRequest
            }
            Self::Decode(_) | Self::Cancelled => ErrorKind::Unknown,
            Self::RetriesExhausted { source, .. } => source.kind(),
        }
    }

    /// Details reported by the remote side, if this came from a response
    pub fn failure(&self) -> Option<&RemoteFailure> {
        match self {
            Self::Remote { failure, .. } => Some(failure),
            Self::RetriesExhausted { source, .. } => source.failure(),
            _ => None,
        }
    }

    /// Quota exhaustion: any 403, or a 429 whose reason names a quota
    pub fn is_quota(&self) -> bool {
        match self {
            Self::Remote { kind: ErrorKind::Forbidden, .. } => true,
            Self::Remote { kind: ErrorKind::RateLimited, failure } => failure
                .reason
                .as_deref()
                .is_some_and(|reason| QUOTA_REASONS.contains(&reason)),
            _ => false,
        }
    }

    /// Handled by the inner retry loop
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote { kind, .. } if kind.is_transient()) && !self.is_quota()
    }
}

impl From<TapError> for ApiError {
    fn from(err: TapError) -> Self {
        match err {
            TapError::Config(message) => Self::Config(message),
            TapError::InvalidInput(message) => Self::InvalidParameters(message),
        }
    }
}

impl ErrorClassification for ApiError {
    fn is_retryable(&self) -> bool {
        self.is_transient() || self.is_quota()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Info,
            _ if self.is_retryable() => ErrorSeverity::Warning,
            Self::Config(_) | Self::Credential(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        self.is_quota().then(|| Duration::from_secs(QUOTA_WAIT_SECS))
    }
}
