//! Two-tier retry around every API call.
//!
//! The inner tier retries transient failures (5xx, 429 bursts, dropped
//! connections) with exponential backoff. The outer tier wraps a complete
//! inner loop and retries quota exhaustion after a long fixed pause.
//! Anything else is surfaced on first occurrence.

use std::future::Future;
use std::sync::Arc;

use searchtap_common::resilience::{
    Clock, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy,
};
use searchtap_domain::{QuotaRetrySettings, TransientRetrySettings};
use tokio_util::sync::CancellationToken;

use super::errors::{ApiError, RetryPhase};

/// Retries only quota exhaustion
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaPolicy;

impl RetryPolicy<ApiError> for QuotaPolicy {
    fn should_retry(&self, error: &ApiError, _attempt: u32) -> RetryDecision {
        if error.is_quota() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Retries server errors, burst throttling and connection failures
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientPolicy;

impl RetryPolicy<ApiError> for TransientPolicy {
    fn should_retry(&self, error: &ApiError, _attempt: u32) -> RetryDecision {
        if error.is_transient() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Fixed pause, no jitter: quota windows reset on the provider's schedule
pub fn quota_config(settings: &QuotaRetrySettings) -> Result<RetryConfig, ApiError> {
    RetryConfig::builder()
        .max_attempts(settings.max_attempts)
        .fixed_backoff(settings.wait())
        .no_jitter()
        .unlimited_time()
        .build()
        .map_err(|e| ApiError::Config(format!("quota retry: {e}")))
}

/// Exponential `initial * factor^retry`, capped, optionally fully jittered
pub fn transient_config(settings: &TransientRetrySettings) -> Result<RetryConfig, ApiError> {
    let builder = RetryConfig::builder()
        .max_attempts(settings.max_attempts)
        .exponential_backoff(settings.initial_delay(), settings.factor, settings.max_delay())
        .unlimited_time();
    let builder = if settings.jitter { builder.full_jitter() } else { builder.no_jitter() };
    builder.build().map_err(|e| ApiError::Config(format!("transient retry: {e}")))
}

/// Nested quota/transient retry executors sharing one clock and shutdown
pub struct RetryOrchestrator {
    quota: RetryExecutor<QuotaPolicy, Arc<dyn Clock>>,
    transient: RetryExecutor<TransientPolicy, Arc<dyn Clock>>,
}

impl RetryOrchestrator {
    pub fn new(
        quota: RetryConfig,
        transient: RetryConfig,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            quota: RetryExecutor::new(quota, QuotaPolicy)
                .with_clock(clock.clone())
                .with_shutdown(shutdown.clone()),
            transient: RetryExecutor::new(transient, TransientPolicy)
                .with_clock(clock)
                .with_shutdown(shutdown),
        }
    }

    pub fn from_settings(
        quota: &QuotaRetrySettings,
        transient: &TransientRetrySettings,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Result<Self, ApiError> {
        Ok(Self::new(quota_config(quota)?, transient_config(transient)?, clock, shutdown))
    }

    pub fn quota_config(&self) -> &RetryConfig {
        self.quota.config()
    }

    pub fn transient_config(&self) -> &RetryConfig {
        self.transient.config()
    }

    /// Run `operation` until it succeeds or a tier gives up
    ///
    /// Every invocation of `operation` is one remote attempt.
    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let operation = &operation;
        let transient = &self.transient;

        self.quota
            .execute(|| async move {
                transient
                    .execute(operation)
                    .await
                    .map_err(|err| surface(err, RetryPhase::Transient))
            })
            .await
            .map_err(|err| surface(err, RetryPhase::Quota))
    }
}

/// Collapse an executor error back into the call's error type
fn surface(err: RetryError<ApiError>, phase: RetryPhase) -> ApiError {
    match err {
        RetryError::NonRetryable { error, .. } => error,
        RetryError::AttemptsExhausted { attempts, last_error } => {
            ApiError::RetriesExhausted { phase, attempts, source: Box::new(last_error) }
        }
        RetryError::TimeoutExceeded { last_error, .. } => last_error,
        RetryError::Cancelled { .. } => ApiError::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use searchtap_common::resilience::MockClock;

    use super::*;
    use crate::api::errors::{ErrorKind, RemoteFailure};

    fn remote(kind: ErrorKind, status: u16) -> ApiError {
        ApiError::remote(kind, RemoteFailure { status: Some(status), ..RemoteFailure::default() })
    }

    fn orchestrator(clock: &MockClock, jitter: bool) -> RetryOrchestrator {
        let transient = TransientRetrySettings { jitter, ..TransientRetrySettings::default() };
        RetryOrchestrator::from_settings(
            &QuotaRetrySettings::default(),
            &transient,
            Arc::new(clock.clone()),
            CancellationToken::new(),
        )
        .unwrap()
    }

    /// Replays `script` one entry per attempt, then succeeds
    async fn run_script(orchestrator: &RetryOrchestrator, script: &[ApiError]) -> (Result<u32, ApiError>, u32) {
        let calls = AtomicU32::new(0);
        let result = orchestrator
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                match script.get(n as usize) {
                    Some(err) => Err(err.clone()),
                    None => Ok(n + 1),
                }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn default_configs_follow_published_policy() {
        let quota = quota_config(&QuotaRetrySettings::default()).unwrap();
        assert_eq!(quota.max_attempts, 2);
        assert_eq!(quota.backoff.calculate_delay(0), Duration::from_secs(900));
        assert_eq!(quota.jitter, searchtap_common::resilience::Jitter::None);

        let transient = transient_config(&TransientRetrySettings::default()).unwrap();
        assert_eq!(transient.max_attempts, 7);
        assert_eq!(transient.backoff.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(transient.backoff.calculate_delay(3), Duration::from_secs(27));
        assert_eq!(transient.jitter, searchtap_common::resilience::Jitter::Full);
    }

    #[test]
    fn invalid_settings_surface_as_config_errors() {
        let quota = QuotaRetrySettings { max_attempts: 0, ..QuotaRetrySettings::default() };
        let err = quota_config(&quota).unwrap_err();
        assert!(
            matches!(&err, ApiError::Config(m) if m.starts_with("quota retry: invalid retry configuration"))
        );

        let transient = TransientRetrySettings { factor: 0.5, ..TransientRetrySettings::default() };
        let err = RetryOrchestrator::from_settings(
            &QuotaRetrySettings::default(),
            &transient,
            Arc::new(MockClock::new()),
            CancellationToken::new(),
        )
        .err();
        assert!(matches!(&err, Some(ApiError::Config(m)) if m.contains("exponential base")));
    }

    #[tokio::test]
    async fn rate_limited_then_success() {
        let clock = MockClock::new();
        let script = vec![remote(ErrorKind::RateLimited, 429); 6];

        let (result, calls) = run_script(&orchestrator(&clock, false), &script).await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 7);
        let expected: Vec<_> = [1, 3, 9, 27, 81, 243].into_iter().map(Duration::from_secs).collect();
        assert_eq!(clock.sleeps(), expected);
    }

    #[tokio::test]
    async fn seven_rate_limits_exhaust_transient_tier() {
        let clock = MockClock::new();
        let script = vec![remote(ErrorKind::RateLimited, 429); 7];

        let (result, calls) = run_script(&orchestrator(&clock, true), &script).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ApiError::RetriesExhausted { phase: RetryPhase::Transient, attempts: 7, .. }));
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(calls, 7);
        assert_eq!(clock.sleeps().len(), 6);
    }

    #[tokio::test]
    async fn quota_waits_once_then_gives_up() {
        let clock = MockClock::new();
        let script = vec![remote(ErrorKind::Forbidden, 403); 2];

        let (result, calls) = run_script(&orchestrator(&clock, true), &script).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ApiError::RetriesExhausted { phase: RetryPhase::Quota, attempts: 2, .. }));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(calls, 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(900)]);
    }

    #[tokio::test]
    async fn bad_request_never_waits() {
        let clock = MockClock::new();

        let (result, calls) =
            run_script(&orchestrator(&clock, true), &[remote(ErrorKind::BadRequest, 400)]).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::BadRequest);
        assert_eq!(calls, 1);
        assert!(clock.sleeps().is_empty());
    }

    /// Validates the worst case of 2 x 7 attempts.
    ///
    /// Assertions:
    /// - A quota failure ending the first inner loop triggers the outer wait
    /// - The second inner loop gets a fresh transient budget
    #[tokio::test]
    async fn worst_case_is_fourteen_attempts() {
        let clock = MockClock::new();
        let mut script = vec![remote(ErrorKind::ServerError, 503); 6];
        script.push(remote(ErrorKind::Forbidden, 403));
        script.extend(vec![remote(ErrorKind::ServerError, 500); 7]);

        let (result, calls) = run_script(&orchestrator(&clock, false), &script).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ApiError::RetriesExhausted { phase: RetryPhase::Transient, attempts: 7, .. }));
        assert_eq!(calls, 14);
        assert_eq!(clock.sleeps().iter().filter(|d| **d == Duration::from_secs(900)).count(), 1);
    }

    #[tokio::test]
    async fn daily_quota_429_takes_the_quota_path() {
        let clock = MockClock::new();
        let daily = ApiError::remote(
            ErrorKind::RateLimited,
            RemoteFailure {
                status: Some(429),
                reason: Some("dailyLimitExceeded".into()),
                ..RemoteFailure::default()
            },
        );

        let (result, calls) = run_script(&orchestrator(&clock, true), &[daily]).await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(900)]);
    }

    #[tokio::test]
    async fn shutdown_before_call_cancels() {
        let token = CancellationToken::new();
        token.cancel();
        let orchestrator = RetryOrchestrator::from_settings(
            &QuotaRetrySettings::default(),
            &TransientRetrySettings::default(),
            Arc::new(MockClock::new()),
            token,
        )
        .unwrap();

        let result: Result<(), ApiError> = orchestrator.run(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }
}
