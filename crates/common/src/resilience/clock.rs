//! Time abstraction shared by the retry executor and the rate limiter.
//!
//! Production code runs on [`SystemClock`], which reads tokio's clock so that
//! paused-time tests still work. Tests that must observe *which* waits were
//! requested use [`MockClock`]: its `sleep` returns immediately, advances the
//! mock time and records the requested duration.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Trait for time operations to enable deterministic testing
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);

    /// Get seconds since UNIX epoch
    fn unix_seconds(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

/// Real clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

/// Mock clock for deterministic testing
///
/// Cloning shares the underlying time and the sleep log, so a test can keep
/// one handle while the code under test owns another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self::with_current_time(Instant::now())
    }

    /// Create a new mock clock with a specific start time
    pub fn with_current_time(start: Instant) -> Self {
        Self {
            start,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Advance the mock clock by a duration without recording a sleep
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }

    /// Every duration passed to [`Clock::sleep`], in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Sum of all recorded sleeps
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
        // Give other tasks a chance to run, like a real timer would.
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sleep_advances_time_and_records() {
        let clock = MockClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_secs(900)).await;
        clock.sleep(Duration::from_millis(250)).await;

        assert_eq!(clock.now() - before, Duration::from_millis(900_250));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(900), Duration::from_millis(250)]);
        assert_eq!(clock.total_slept(), Duration::from_millis(900_250));
    }

    #[test]
    fn advance_does_not_record_sleep() {
        let clock = MockClock::new();
        clock.advance_millis(1_500);

        assert_eq!(clock.elapsed(), Duration::from_millis(1_500));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let clock = MockClock::new();
        let shared = Arc::new(clock.clone());

        shared.sleep(Duration::from_secs(3)).await;

        assert_eq!(clock.elapsed(), Duration::from_secs(3));
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn trait_objects_are_clocks() {
        let mock = MockClock::new();
        let clock: Arc<dyn Clock> = Arc::new(mock.clone());

        clock.sleep(Duration::from_secs(1)).await;

        assert_eq!(mock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_tokio_time() {
        let clock = SystemClock;
        let before = clock.now();

        clock.sleep(Duration::from_secs(60)).await;

        assert!(clock.now() - before >= Duration::from_secs(60));
    }
}
