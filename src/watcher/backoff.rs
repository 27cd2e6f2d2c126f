//! Reconnect backoff - capped exponential delay

use std::time::Duration;

/// Lower bound for `initial`
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Capped exponential backoff
///
/// Delay doubles per attempt starting at `initial`, never exceeding `max`.
/// `reset()` after the first successful payload.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_DELAY);
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay for the next attempt (advances the attempt counter)
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.min(16));
        self.attempt = self.attempt.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Consecutive attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60))
    }
}
