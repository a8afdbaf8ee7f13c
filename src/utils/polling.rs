//! Polling utilities for waiting on conditions with a deadline
//!
//! The loop never reads the wall clock or sleeps directly: both go through a
//! [`Clock`], so tests can run against tokio's paused time without waiting.
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Source of time for polling loops
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of a polling loop that did not error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult<T> {
    /// The condition was met
    Done(T),
    /// The deadline elapsed first
    TimedOut { elapsed: Duration, attempts: u32 },
}

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub deadline: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub description: String,
}

impl PollingConfig {
    /// Create a fixed-interval polling configuration
    pub fn new(deadline: Duration, interval: Duration, description: impl Into<String>) -> Self {
        Self {
            deadline,
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            description: description.into(),
        }
    }

    /// Grow the interval by `multiplier` after every attempt, capped at `max_interval`
    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_interval = max_interval.max(self.initial_interval);
        self
    }

    /// Interval to wait after the given (1-based) attempt
    pub fn interval_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_interval.as_secs_f64()))
    }

    /// Poll until condition is met or the deadline elapses
    ///
    /// The condition function should return:
    /// - Ok(Some(T)) when condition is met (returns `PollResult::Done`)
    /// - Ok(None) when condition is not yet met (continues polling)
    /// - Err(e) when an error occurs (stops polling and returns error)
    pub async fn poll<F, Fut, T, E>(&self, clock: &dyn Clock, mut condition: F) -> Result<PollResult<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        info!("{}...", self.description);

        let start = clock.now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            if let Some(value) = condition().await? {
                info!("✓ {}", self.description);
                return Ok(PollResult::Done(value));
            }

            let elapsed = clock.now().saturating_duration_since(start);
            if elapsed >= self.deadline {
                return Ok(PollResult::TimedOut { elapsed, attempts });
            }

            // Never sleep past the deadline
            let wait = self.interval_after(attempts).min(self.deadline - elapsed);
            debug!(
                attempt = attempts,
                wait_ms = wait.as_millis() as u64,
                "{}: not yet",
                self.description
            );
            clock.sleep(wait).await;
        }
    }
}
