//! Exponential backoff for the reconnect path.
//!
//! The delay before attempt `n` is:
//!
//! ```text
//! delay[n] = min(initial * multiplier^(n-1), max_delay)
//! ```
//!
//! With the defaults (initial = 1s, multiplier = 2.0, 5 attempts) the
//! schedule is 1s, 2s, 4s, 8s, 16s, after which `next_sleep` reports
//! exhaustion.
//!
//! ```ignore
//! let mut backoff = Backoff::default();
//! while let Ok(delay) = backoff.next_sleep() {
//!     tokio::time::sleep(delay).await;
//!     if session.connect().await.is_ok() {
//!         break;
//!     }
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

/// Returned by [`Backoff::next_sleep`] once the attempt budget is spent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackoffError {
    /// The configured number of attempts has been used up.
    #[error("Maximum number of attempts exceeded: {0}")]
    MaxAttemptLimitError(u32),
}

/// Exponential backoff controller with an explicit attempt budget.
///
/// Every call to [`next_sleep`](Backoff::next_sleep) consumes one attempt
/// from the budget and returns the delay to wait before that attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    attempt: u32,
    max_attempts: u32,
}

impl Backoff {
    /// Creates a backoff controller.
    ///
    /// A `multiplier` below 1.0 is clamped to 1.0 so delays never shrink.
    pub fn new(initial: Duration, max: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            initial_delay: initial,
            current_delay: initial.min(max),
            max_delay: max,
            multiplier: multiplier.max(1.0),
            attempt: 0,
            max_attempts,
        }
    }

    /// Restores the initial delay and refills the attempt budget.
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay.min(self.max_delay);
        self.attempt = 0;
    }

    /// Consumes one attempt and returns how long to sleep before it.
    pub fn next_sleep(&mut self) -> Result<Duration, BackoffError> {
        if self.attempt >= self.max_attempts {
            return Err(BackoffError::MaxAttemptLimitError(self.max_attempts));
        }
        self.attempt += 1;

        let sleep = self.current_delay;

        let next_delay_secs = self.current_delay.as_secs_f64() * self.multiplier;
        self.current_delay = Duration::from_secs_f64(next_delay_secs).min(self.max_delay);

        Ok(sleep)
    }

    /// Number of attempts consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Total attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts still available.
    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }

    /// Delay that the next call to `next_sleep` will return.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for Backoff {
    /// 1s initial delay, doubling, capped at 60s, five attempts.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 2.0, 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_default_schedule_doubles() {
        let mut backoff = Backoff::default();

        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_sleep().ok())
            .map(|d| d.as_secs())
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_backoff_exhaustion_reports_budget() {
        let mut backoff = Backoff::default();
        for _ in 0..5 {
            backoff.next_sleep().unwrap();
        }

        assert_eq!(backoff.remaining(), 0);
        assert_eq!(
            backoff.next_sleep(),
            Err(BackoffError::MaxAttemptLimitError(5))
        );
        // Exhaustion does not advance the counter further.
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn test_backoff_respects_max_delay() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 2.0, 10);

        let mut last = Duration::ZERO;
        while let Ok(delay) = backoff.next_sleep() {
            assert!(delay <= Duration::from_secs(5));
            last = delay;
        }
        assert_eq!(last, Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default();
        backoff.next_sleep().unwrap();
        backoff.next_sleep().unwrap();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.current_delay(), Duration::from_secs(1));
        assert_eq!(backoff.remaining(), 5);
    }

    #[test]
    fn test_backoff_zero_budget_fails_immediately() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0, 0);
        assert!(backoff.next_sleep().is_err());
    }

    #[test]
    fn test_backoff_clamps_shrinking_multiplier() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(60), 0.5, 3);
        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(2));
        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(2));
    }
}
