//! Capped exponential backoff between failed cycles

use std::time::Duration;

/// Delay sequence `initial, 2*initial, 4*initial, ...` capped at `max`.
///
/// An `initial` of zero yields zero forever, i.e. immediate retry.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; each call doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let multiplier = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self
            .initial
            .checked_mul(multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Start over after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
