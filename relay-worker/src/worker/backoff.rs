//! Reconnect delay schedule for the pending-entry feed.

use std::time::Duration;

/// Doubling reconnect delay, bounded by a floor and a ceiling
///
/// The Nth consecutive delay with no intervening reset equals
/// `min(floor * 2^(N-1), ceiling)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    next: Duration,
}

impl Backoff {
    /// Creates a schedule starting at `floor`
    #[must_use]
    pub const fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            next: floor,
        }
    }

    /// Returns the delay to wait before the next reconnect and advances the
    /// schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Returns the schedule to its floor; called on every healthy snapshot
    pub fn reset(&mut self) {
        self.next = self.floor;
    }
}
