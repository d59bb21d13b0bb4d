//! Polling combinators
//!
//! [`Eventually::run`] retries until the predicate succeeds; [`Eventually::hold`]
//! requires the predicate to keep succeeding for a whole grace period.
//! Predicates must only observe, since they may run any number of times.

use super::clock::Clock;
use crate::config::PollingConfig;
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Bounded poller with a fixed interval
#[derive(Clone)]
pub struct Eventually {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    interval: Duration,
    what: String,
}

impl std::fmt::Debug for Eventually {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eventually")
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .field("what", &self.what)
            .finish()
    }
}

impl Eventually {
    /// Create a poller with the harness-wide default bounds
    pub fn new(clock: Arc<dyn Clock>, polling: &PollingConfig) -> Self {
        Self {
            clock,
            timeout: polling.timeout,
            interval: polling.interval,
            what: "condition".to_string(),
        }
    }

    /// Override the deadline for this wait
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the polling interval for this wait
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Name what is being waited for; used in timeout errors
    pub fn describe(mut self, what: impl Into<String>) -> Self {
        self.what = what.into();
        self
    }

    /// Poll `predicate` until it returns `Ok`
    ///
    /// Retryable errors are remembered and polling continues. A fatal error
    /// is returned as-is on the attempt it occurs. When the deadline passes
    /// the last retryable error is wrapped in [`Error::Timeout`].
    pub async fn run<T, F, Fut>(&self, mut predicate: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = self.clock.elapsed();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let last = match predicate().await {
                Ok(value) => {
                    debug!("{} converged after {} attempt(s)", self.what, attempts);
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            let elapsed = self.clock.elapsed().saturating_sub(start);
            debug!(attempt = attempts, ?elapsed, "waiting for {}: {}", self.what, last);
            if elapsed >= self.timeout {
                return Err(Error::Timeout {
                    what: self.what.clone(),
                    elapsed,
                    attempts,
                    last: Box::new(last),
                });
            }

            self.clock
                .sleep(self.interval.min(self.timeout - elapsed))
                .await;
        }
    }

    /// Require `predicate` to succeed at every poll for `period`
    ///
    /// Any failure, retryable or not, ends the hold as an expectation
    /// violation. The predicate is evaluated at least once at the start and
    /// once at the end of the period.
    pub async fn hold<F, Fut>(&self, period: Duration, mut predicate: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let start = self.clock.elapsed();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let elapsed = self.clock.elapsed().saturating_sub(start);
            if let Err(e) = predicate().await {
                return Err(Error::Assertion(format!(
                    "{} stopped holding after {:?} ({} checks): {}",
                    self.what, elapsed, attempts, e
                )));
            }

            if elapsed >= period {
                debug!("{} held for {:?} ({} checks)", self.what, period, attempts);
                return Ok(());
            }

            self.clock.sleep(self.interval.min(period - elapsed)).await;
        }
    }
}
