//! Sliding-window rate limiting.
//!
//! [`SlidingWindowLimiter`] admits at most `max_calls` acquisitions in any
//! rolling `window`. Callers that find the window saturated wait
//! cooperatively for the oldest call to age out; they are never rejected.
//!
//! The window lock is a fair tokio mutex that the current waiter keeps while
//! it sleeps, so blocked callers are admitted strictly in arrival order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::clock::{Clock, SystemClock};

/// Errors returned by cancellable acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Shutdown was signalled before a slot became free
    #[error("rate limiter wait cancelled by shutdown")]
    Cancelled,
}

/// Configuration for the sliding-window limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlidingWindowConfig {
    /// Maximum number of calls admitted per window
    pub max_calls: u32,
    /// Length of the rolling window
    pub window: Duration,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self { max_calls: 1200, window: Duration::from_secs(60) }
    }
}

impl SlidingWindowConfig {
    /// Create a new configuration builder
    pub fn builder() -> SlidingWindowConfigBuilder {
        SlidingWindowConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_calls == 0 {
            return Err("max_calls must be greater than 0".to_string());
        }
        if self.window.is_zero() {
            return Err("window must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Builder for SlidingWindowConfig
#[derive(Debug)]
pub struct SlidingWindowConfigBuilder {
    config: SlidingWindowConfig,
}

impl Default for SlidingWindowConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingWindowConfigBuilder {
    pub fn new() -> Self {
        Self { config: SlidingWindowConfig::default() }
    }

    pub fn max_calls(mut self, max_calls: u32) -> Self {
        self.config.max_calls = max_calls;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn build(self) -> Result<SlidingWindowConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimiterStats {
    /// Total slots handed out
    pub acquired: u64,
    /// Acquisitions that had to wait for the window to roll
    pub delayed: u64,
}

/// Rolling-window rate limiter shared by every caller of one client
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use searchtap_common::resilience::{SlidingWindowConfig, SlidingWindowLimiter};
///
/// # async fn example() -> Result<(), String> {
/// let config = SlidingWindowConfig::builder()
///     .max_calls(10)
///     .window(Duration::from_secs(1))
///     .build()?;
/// let limiter = SlidingWindowLimiter::new(config)?;
///
/// limiter.acquire().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    config: SlidingWindowConfig,
    calls: Mutex<VecDeque<Instant>>,
    clock: Arc<C>,
    acquired: AtomicU64,
    delayed: AtomicU64,
}

impl SlidingWindowLimiter<SystemClock> {
    /// Create a limiter on the system clock
    pub fn new(config: SlidingWindowConfig) -> Result<Self, String> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    /// Create a limiter with a custom clock
    pub fn with_clock(config: SlidingWindowConfig, clock: C) -> Result<Self, String> {
        config.validate()?;
        let capacity = usize::try_from(config.max_calls).unwrap_or(usize::MAX).min(4096);
        Ok(Self {
            calls: Mutex::new(VecDeque::with_capacity(capacity)),
            clock: Arc::new(clock),
            acquired: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    /// Wait until a slot is free, then take it
    #[instrument(skip(self), level = "trace")]
    pub async fn acquire(&self) {
        let calls = self.calls.lock().await;
        // Without a shutdown token the wait cannot be interrupted.
        let _ = self.admit(calls, None).await;
    }

    /// Like [`acquire`](Self::acquire), but gives up when `shutdown` fires
    #[instrument(skip(self, shutdown), level = "trace")]
    pub async fn acquire_until_cancelled(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<(), RateLimitError> {
        let calls = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(RateLimitError::Cancelled),
            guard = self.calls.lock() => guard,
        };
        self.admit(calls, Some(shutdown)).await
    }

    /// Take a slot only if one is free right now and nobody is queued
    pub fn try_acquire(&self) -> bool {
        let Ok(mut calls) = self.calls.try_lock() else {
            return false;
        };
        let now = self.clock.now();
        self.evict_expired(&mut calls, now);
        if calls.len() < self.capacity() {
            calls.push_back(now);
            self.acquired.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of calls currently counted against the window
    pub async fn calls_in_window(&self) -> usize {
        let mut calls = self.calls.lock().await;
        self.evict_expired(&mut calls, self.clock.now());
        calls.len()
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
        }
    }

    async fn admit(
        &self,
        mut calls: MutexGuard<'_, VecDeque<Instant>>,
        shutdown: Option<&CancellationToken>,
    ) -> Result<(), RateLimitError> {
        let mut counted_delay = false;
        loop {
            let now = self.clock.now();
            self.evict_expired(&mut calls, now);

            if calls.len() < self.capacity() {
                calls.push_back(now);
                self.acquired.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }

            let wait = calls
                .front()
                .map_or(self.config.window, |oldest| {
                    (*oldest + self.config.window).saturating_duration_since(now)
                });

            if !counted_delay {
                counted_delay = true;
                self.delayed.fetch_add(1, Ordering::Relaxed);
            }
            debug!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                in_window = calls.len(),
                "Rate limit window saturated, waiting"
            );

            match shutdown {
                Some(token) => tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(RateLimitError::Cancelled),
                    () = self.clock.sleep(wait) => {}
                },
                None => self.clock.sleep(wait).await,
            }
        }
    }

    fn evict_expired(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn capacity(&self) -> usize {
        usize::try_from(self.config.max_calls).unwrap_or(usize::MAX)
    }
}
