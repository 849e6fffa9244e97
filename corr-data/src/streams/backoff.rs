use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Randomised exponential backoff: each wait is drawn uniformly from `[0, base]`, and `base`
/// doubles after every failed attempt up to the configured ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    base: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            base: config.base,
        }
    }

    /// Current upper bound of the next wait.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Draw the next jittered wait.
    pub fn next_delay(&self) -> Duration {
        let upper_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=upper_ms))
    }

    /// Double the upper bound after a failed attempt.
    pub fn escalate(&mut self) {
        self.base = self.base.saturating_mul(2).min(self.config.max);
    }

    pub fn reset(&mut self) {
        self.base = self.config.base;
    }
}
