//! Resilience patterns for remote calls
//!
//! This module provides **generic, reusable** building blocks:
//! - **Retry**: configurable retry executor with backoff, jitter, a total
//!   time budget and shutdown-aware waits
//! - **Rate limiting**: a sliding-window limiter that blocks callers until
//!   the window has room
//! - **Clock**: time abstraction so both can be tested without real delays
//!
//! Nothing here knows about a particular remote API. Error taxonomies and
//! the policies that interpret them live with the client that owns them.

pub mod clock;
pub mod rate_limiter;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::{
    LimiterStats, RateLimitError, SlidingWindowConfig, SlidingWindowConfigBuilder,
    SlidingWindowLimiter,
};
pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryConfigError,
    RetryDecision, RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
