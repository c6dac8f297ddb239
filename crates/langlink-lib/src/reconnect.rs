//! Reconnection pacing for the serial link.
//!
//! The accessory is either plugged in or not; retrying faster or slower
//! does not change that, so discovery is retried on a fixed delay rather
//! than with a growing backoff. Failures are still counted so callers can
//! log the first miss loudly and stay quiet afterwards.

use std::time::{Duration, Instant};

/// Fixed-delay retry gate.
#[derive(Debug)]
pub struct ReconnectState {
    delay: Duration,
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl ReconnectState {
    /// Create a new gate with the given delay between attempts.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    /// Whether enough time has passed since the last failed attempt.
    ///
    /// Returns `true` if no attempt has failed yet.
    pub fn should_attempt(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.delay,
        }
    }

    /// Record a failed attempt made at `now`.
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(now);
    }

    /// Record a successful connection and reset the gate.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_attempt = None;
    }

    /// Number of consecutive failed attempts.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn initial_should_attempt_is_true() {
        let state = ReconnectState::new(SEC);
        assert!(state.should_attempt(Instant::now()));
        assert_eq!(state.consecutive_failures(), 0);
    }

    #[test]
    fn blocked_until_delay_elapses() {
        let t0 = Instant::now();
        let mut state = ReconnectState::new(Duration::from_millis(500));
        state.record_failure(t0);
        assert!(!state.should_attempt(t0));
        assert!(!state.should_attempt(t0 + Duration::from_millis(499)));
        assert!(state.should_attempt(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn delay_does_not_grow() {
        let t0 = Instant::now();
        let delay = Duration::from_millis(100);
        let mut state = ReconnectState::new(delay);
        let mut now = t0;
        for n in 1..=5 {
            state.record_failure(now);
            assert_eq!(state.consecutive_failures(), n);
            assert_eq!(state.delay(), delay);
            now += delay;
            assert!(state.should_attempt(now));
        }
    }

    #[test]
    fn success_resets() {
        let t0 = Instant::now();
        let mut state = ReconnectState::new(Duration::from_secs(60));
        state.record_failure(t0);
        state.record_failure(t0);
        assert_eq!(state.consecutive_failures(), 2);

        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.should_attempt(t0));
    }

    #[test]
    fn multiple_success_calls_idempotent() {
        let mut state = ReconnectState::new(SEC);
        state.record_failure(Instant::now());
        state.record_success();
        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
    }
}
