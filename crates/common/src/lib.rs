//! Common building blocks shared across SearchTap crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification vocabulary
//! - `observability`: tracing support (pulled in by `runtime`)
//! - `runtime`: async infrastructure (clock, retry, rate limiting)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, Clock, Jitter, MockClock, RetryConfig, RetryConfigBuilder, RetryConfigError,
    RetryDecision, RetryError, RetryExecutor, RetryPolicy, RetryResult, SlidingWindowConfig,
    SlidingWindowLimiter, SystemClock,
};
