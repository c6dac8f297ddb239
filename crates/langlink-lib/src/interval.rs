//! Fixed-period deadlines on the monotonic clock.

use std::time::{Duration, Instant};

/// A repeating deadline.
///
/// Due immediately after creation. When it fires it is re-armed to
/// `now + period`, measured from the moment it fired, so a late poll delays
/// the next deadline by at most one poll and drift never accumulates past
/// one period.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    next: Instant,
}

impl Interval {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self { period, next: now }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    /// Returns `true` and re-arms if the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next = now + self.period;
        true
    }
}
