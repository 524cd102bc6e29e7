//! Generic retry executor with pluggable policies, backoff and jitter.
//!
//! The executor knows nothing about the errors it retries: a [`RetryPolicy`]
//! decides whether a failure is worth another attempt, the [`RetryConfig`]
//! decides how many attempts are allowed and how long to wait in between.
//! Waits go through a [`Clock`] and can be interrupted by a shutdown
//! [`CancellationToken`].
//!
//! After every failed attempt the executor evaluates, in order:
//! 1. the policy (a `Stop` decision surfaces the error immediately),
//! 2. the attempt ceiling (no wait is spent once it is reached),
//! 3. the optional total-time budget,
//! 4. the wait itself.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::clock::{Clock, SystemClock};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    #[error("all {attempts} attempts exhausted, last error: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: E },

    /// The operation failed with an error the policy refused to retry
    #[error("operation failed with non-retryable error: {error}")]
    NonRetryable { error: E, attempts: u32 },

    /// The next wait would overrun the configured total-time budget
    #[error("retry budget exceeded after {elapsed:?}, last error: {last_error}")]
    TimeoutExceeded { elapsed: Duration, last_error: E },

    /// Shutdown was signalled while waiting between attempts
    #[error("retry cancelled by shutdown after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of attempts made before this error was produced, if known
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::AttemptsExhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. }
            | Self::Cancelled { attempts } => Some(*attempts),
            Self::TimeoutExceeded { .. } => None,
        }
    }

    /// The last error returned by the operation, if any
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { last_error, .. } | Self::TimeoutExceeded { last_error, .. } => {
                Some(last_error)
            }
            Self::NonRetryable { error, .. } => Some(error),
            Self::Cancelled { .. } => None,
        }
    }
}

/// A [`RetryConfig`] that cannot drive an executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid retry configuration: {0}")]
pub struct RetryConfigError(pub String);

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including result and summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    pub total_delay: Duration,
    pub elapsed: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide whether the error returned by attempt number `attempt`
    /// (1-based) should be retried
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the configured backoff delay
    Retry,
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: initial_delay * base^retry, capped at max_delay
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay before retry number `retry` (0 for the first retry)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let delay_ms = initial_delay.as_millis() as f64 * base.powi(exponent);
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: uniformly 0 to calculated_delay
    Full,
    /// Equal jitter: calculated_delay/2 to calculated_delay
    Equal,
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(self, delay: Duration) -> Duration {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(random_up_to(delay_ms)),
            Self::Equal => {
                let half = delay_ms / 2;
                Duration::from_millis(half + random_up_to(delay_ms - half))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
    /// Maximum total time to spend retrying
    pub max_total_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Equal,
            max_total_time: None,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.max_attempts == 0 {
            return Err(RetryConfigError("max_attempts must be greater than 0".to_string()));
        }

        if let BackoffStrategy::Exponential { base, .. } = &self.backoff {
            if !base.is_finite() || *base < 1.0 {
                return Err(RetryConfigError(
                    "exponential base must be a finite value >= 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn full_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Full;
        self
    }

    pub fn equal_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Equal;
        self
    }

    pub fn max_total_time(mut self, duration: Duration) -> Self {
        self.config.max_total_time = Some(duration);
        self
    }

    pub fn unlimited_time(mut self) -> Self {
        self.config.max_total_time = None;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-run retry bookkeeping
#[derive(Debug, Clone, Default)]
struct RetryContext {
    attempt: u32,
    total_delay: Duration,
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P, C = SystemClock> {
    config: RetryConfig,
    policy: P,
    clock: C,
    shutdown: Option<CancellationToken>,
}

impl<P> RetryExecutor<P, SystemClock> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy, clock: SystemClock, shutdown: None }
    }
}

impl<P, C: Clock> RetryExecutor<P, C> {
    /// Replace the clock used for waits and elapsed-time accounting
    pub fn with_clock<C2: Clock>(self, clock: C2) -> RetryExecutor<P, C2> {
        RetryExecutor { config: self.config, policy: self.policy, clock, shutdown: self.shutdown }
    }

    /// Abort waits as soon as `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Execute an operation with retry logic
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = self.clock.now();
        let mut context = RetryContext::default();

        let result = loop {
            if self.is_shut_down() {
                break Err(RetryError::Cancelled { attempts: context.attempt });
            }

            context.attempt += 1;
            debug!(attempt = context.attempt, max = self.config.max_attempts, "Executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if context.attempt > 1 {
                        debug!(attempts = context.attempt, "Operation succeeded after retries");
                    }
                    break Ok(value);
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, context.attempt) {
                RetryDecision::Stop => {
                    debug!(attempt = context.attempt, error = %error, "Retry policy declined to retry");
                    break Err(RetryError::NonRetryable { error, attempts: context.attempt });
                }
                _ if context.attempt >= self.config.max_attempts => {
                    warn!(attempts = context.attempt, error = %error, "All retry attempts exhausted");
                    break Err(RetryError::AttemptsExhausted {
                        attempts: context.attempt,
                        last_error: error,
                    });
                }
                RetryDecision::Retry => {
                    let base = self.config.backoff.calculate_delay(context.attempt - 1);
                    self.config.jitter.apply(base)
                }
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            if let Some(budget) = self.config.max_total_time {
                if elapsed + delay > budget {
                    warn!(elapsed = ?elapsed, budget = ?budget, "Retry budget exceeded");
                    break Err(RetryError::TimeoutExceeded { elapsed, last_error: error });
                }
            }

            warn!(
                attempt = context.attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Operation failed, retrying"
            );

            if !self.pause(delay).await {
                warn!(attempts = context.attempt, "Retry wait interrupted by shutdown");
                break Err(RetryError::Cancelled { attempts: context.attempt });
            }
            context.total_delay += delay;
        };

        RetryOutcome {
            result,
            attempts: context.attempt,
            total_delay: context.total_delay,
            elapsed: self.clock.now().saturating_duration_since(started),
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Returns `false` if shutdown interrupted the wait
    async fn pause(&self, delay: Duration) -> bool {
        match &self.shutdown {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => false,
                () = self.clock.sleep(delay) => true,
            },
            None => {
                self.clock.sleep(delay).await;
                true
            }
        }
    }
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    /// Predicate-based retry policy
    #[derive(Debug, Clone, Copy)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<E, F> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E) -> bool,
    {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if (self.predicate)(error) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
