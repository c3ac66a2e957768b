//! Exponential backoff for token acquisition retries
//!
//! The delay doubles on each failure until it reaches [`MAX_BACKOFF`], and
//! snaps back to [`INITIAL_BACKOFF`] after a successful acquisition.

use std::time::Duration;

/// Starting delay between retries
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling on the delay between retries
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Factor applied to the delay on each failure
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Exponential backoff state owned by the refresh loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
    multiplier: u32,
}

impl Backoff {
    /// Create a backoff with a custom policy.
    ///
    /// A `max` below `initial` is raised to `initial`.
    pub fn new(initial: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            current: initial,
            initial,
            max: max.max(initial),
            multiplier,
        }
    }

    /// Delay to use for the next retry sleep
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grow the delay, kept within `[initial, max]`
    pub fn advance(&mut self) {
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .unwrap_or(self.max)
            .clamp(self.initial, self.max);
    }

    /// Return to the initial delay after a success
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF, BACKOFF_MULTIPLIER)
    }
}
