//! Time abstractions for testable timing operations.
//!
//! Provides a clock abstraction so scheduled-at comparisons, retry timing
//! and worker sleeps can be driven deterministically in tests. Production
//! code uses `RealClock`; tests inject `TestClock` and advance it manually.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

/// Clock abstraction for time operations.
///
/// Enables dependency injection of time sources. `now` is monotonic and used
/// for duration measurements; `now_utc` is wall-clock time used for
/// `scheduled_at` comparisons and timestamps.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// In production this maps to `tokio::time::sleep`; in tests it advances
    /// virtual time immediately.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real clock implementation using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test clock for deterministic time control.
///
/// Monotonic and wall-clock time advance together. Cloning shares the
/// underlying counters, so a clone handed to the system under test can be
/// advanced from the test body.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Monotonic time in nanoseconds since clock creation.
    monotonic_ns: Arc<AtomicU64>,
    /// Wall-clock time as nanoseconds since UNIX_EPOCH.
    system_ns: Arc<AtomicU64>,
    /// Base instant for monotonic time calculations.
    base_instant: Instant,
}

impl TestClock {
    /// Creates a new test clock starting at the current wall-clock time.
    pub fn new() -> Self {
        Self::with_start_time(Utc::now())
    }

    /// Creates a test clock starting at a specific wall-clock time.
    pub fn with_start_time(start: DateTime<Utc>) -> Self {
        let since_epoch = SystemTime::from(start)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_ns: Arc::new(AtomicU64::new(
                u64::try_from(since_epoch.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0),
            )),
            base_instant: Instant::now(),
        }
    }

    /// Advances both clocks by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let duration_ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);

        self.monotonic_ns.fetch_add(duration_ns, Ordering::AcqRel);
        self.system_ns.fetch_add(duration_ns, Ordering::AcqRel);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        let elapsed_ns = self.monotonic_ns.load(Ordering::Acquire);
        self.base_instant + Duration::from_nanos(elapsed_ns)
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let ns = self.system_ns.load(Ordering::Acquire);
        DateTime::<Utc>::from(UNIX_EPOCH + Duration::from_nanos(ns))
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        // In tests, sleep just advances the clock.
        self.advance(duration);
        // Yield so other tasks get a chance to run.
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(10));

        let elapsed = clock.now().duration_since(start);
        assert_eq!(elapsed, Duration::from_secs(10));
    }

    #[test]
    fn test_clock_wall_time_advances() {
        let start = DateTime::<Utc>::from(UNIX_EPOCH + Duration::from_secs(1000));
        let clock = TestClock::with_start_time(start);

        assert_eq!(clock.now_utc(), start);

        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now_utc(), start + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_clock_clones_share_state() {
        let clock = TestClock::new();
        let clone = clock.clone();

        clock.advance(Duration::from_secs(5));
        assert_eq!(clone.now_utc(), clock.now_utc());
    }

    #[tokio::test]
    async fn test_clock_sleep_advances_time() {
        let clock = TestClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_secs(5)).await;

        let elapsed = clock.now().duration_since(start);
        assert_eq!(elapsed, Duration::from_secs(5));
    }
}
