//! Clocks
//!
//! The eventual engine never touches `tokio::time` directly; it asks a
//! [`Clock`] for the elapsed time and to sleep.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Source of time for polling loops
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created
    fn elapsed(&self) -> Duration;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

// =============================================================================
// Tokio Clock
// =============================================================================

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: tokio::time::Instant::now(),
        })
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that advances only when slept on
///
/// Every `sleep` returns immediately after moving the clock forward, and is
/// recorded so callers can assert on the polling cadence.
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Move the clock forward without sleeping
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Durations passed to `sleep`, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        tokio_test::block_on(clock.sleep(Duration::from_secs(2)));
        clock.advance(Duration::from_millis(500));

        assert_eq!(clock.elapsed(), Duration::from_millis(2500));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_timer() {
        let clock = TokioClock::new();
        clock.sleep(Duration::from_secs(30)).await;
        assert!(clock.elapsed() >= Duration::from_secs(30));
    }
}
