//! Circuit breaker governing whether reads from an upstream connection are permitted.
//!
//! ```text
//!            failures >= fail_threshold
//!   Closed ──────────────────────────────▶ Open
//!     ▲                                     │
//!     │ successes >= success_needed,        │ successful dial
//!     │ no failures                         │
//!     │                                     ▼
//!     └──────────────────────────────── HalfOpen
//!                                           │ failures >= fail_threshold
//!                                           └──────────────▶ Open
//! ```

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// [`CircuitBreaker`] state.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum BreakerState {
    /// Reads permitted.
    Closed,
    /// Reads forbidden, a redial is required.
    Open,
    /// Reads permitted while the recovered connection is being probed.
    HalfOpen,
}

/// Resilience gate for one upstream connection.
///
/// Every counted event re-evaluates the transition table immediately, so the observed
/// [`BreakerState`] is never stale between events.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    fail_count: u32,
    success_count: u32,
    fail_threshold: u32,
    success_needed: u32,
    last_dial_success: bool,
}

impl CircuitBreaker {
    pub fn new(fail_threshold: u32, success_needed: u32) -> Self {
        Self {
            state: BreakerState::Closed,
            fail_count: 0,
            success_count: 0,
            fail_threshold,
            success_needed,
            last_dial_success: false,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    pub fn last_dial_success(&self) -> bool {
        self.last_dial_success
    }

    /// Determine if reads are currently permitted. Pure predicate.
    pub fn request_permission(&self) -> bool {
        matches!(self.state, BreakerState::Closed | BreakerState::HalfOpen)
    }

    /// Record a successful read & forward.
    pub fn record_success(&mut self) {
        match self.state {
            // Failures must be consecutive to trip the breaker
            BreakerState::Closed => self.fail_count = 0,
            BreakerState::HalfOpen => self.success_count += 1,
            BreakerState::Open => {}
        }
        self.update_state();
    }

    /// Record a failed read, or the loss of the connection.
    pub fn record_failure(&mut self) {
        self.fail_count += 1;
        self.success_count = 0;
        self.update_state();
    }

    /// Record the outcome of a dial attempt.
    pub fn set_dial_state(&mut self, success: bool) {
        self.last_dial_success = success;
        self.update_state();
    }

    fn update_state(&mut self) {
        let next = match self.state {
            BreakerState::Closed if self.fail_count >= self.fail_threshold => BreakerState::Open,
            BreakerState::Open if self.last_dial_success => BreakerState::HalfOpen,
            BreakerState::HalfOpen if self.fail_count >= self.fail_threshold => BreakerState::Open,
            BreakerState::HalfOpen
                if self.fail_count == 0 && self.success_count >= self.success_needed =>
            {
                BreakerState::Closed
            }
            unchanged => unchanged,
        };

        if next == self.state {
            return;
        }

        match next {
            BreakerState::Open => warn!(
                from = %self.state,
                fail_count = self.fail_count,
                "CircuitBreaker opened, reads suspended until redial succeeds"
            ),
            _ => info!(from = %self.state, to = %next, "CircuitBreaker transitioned"),
        }

        self.state = next;
        self.fail_count = 0;
        self.success_count = 0;
        if next == BreakerState::Open {
            self.last_dial_success = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(9, 20)
    }

    fn open_breaker() -> CircuitBreaker {
        let mut breaker = breaker();
        (0..9).for_each(|_| breaker.record_failure());
        assert_eq!(breaker.state(), BreakerState::Open);
        breaker
    }

    fn half_open_breaker() -> CircuitBreaker {
        let mut breaker = open_breaker();
        breaker.set_dial_state(true);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker
    }

    #[test]
    fn test_closed_to_open_after_consecutive_failures() {
        let mut breaker = breaker();
        for _ in 0..8 {
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::Closed);
            assert!(breaker.request_permission());
        }

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.request_permission());
        assert_eq!(breaker.fail_count(), 0);
    }

    #[test]
    fn test_closed_success_resets_failures() {
        let mut breaker = breaker();
        (0..8).for_each(|_| breaker.record_failure());
        breaker.record_success();
        (0..8).for_each(|_| breaker.record_failure());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_open_to_half_open_on_successful_dial() {
        let mut breaker = open_breaker();

        breaker.set_dial_state(false);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.last_dial_success());

        breaker.set_dial_state(true);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.request_permission());
        assert_eq!((breaker.fail_count(), breaker.success_count()), (0, 0));
    }

    #[test]
    fn test_open_ignores_reads() {
        let mut breaker = open_breaker();
        (0..50).for_each(|_| breaker.record_success());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_half_open_to_closed_after_consecutive_successes() {
        let mut breaker = half_open_breaker();
        for _ in 0..19 {
            breaker.record_success();
            assert_eq!(breaker.state(), BreakerState::HalfOpen);
        }

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!((breaker.fail_count(), breaker.success_count()), (0, 0));
    }

    #[test]
    fn test_half_open_failure_blocks_closing() {
        let mut breaker = half_open_breaker();
        (0..19).for_each(|_| breaker.record_success());
        breaker.record_failure();
        assert_eq!((breaker.fail_count(), breaker.success_count()), (1, 0));

        // A failure in HalfOpen keeps the breaker probing until it reopens
        (0..20).for_each(|_| breaker.record_success());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!((breaker.fail_count(), breaker.success_count()), (1, 20));

        (0..100).for_each(|_| breaker.record_success());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        (0..8).for_each(|_| breaker.record_failure());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_half_open_to_open_after_failures() {
        let mut breaker = half_open_breaker();
        for _ in 0..8 {
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::HalfOpen);
        }

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.request_permission());
        assert!(!breaker.last_dial_success());
    }
}
