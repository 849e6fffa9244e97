use crate::{error::DataError, exchange::binance::BASE_URL_BINANCE_FUTURES_COMBINED};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of samples held in each sliding window (1 minute at 100ms cadence).
pub const DEFAULT_WINDOW_SIZE: usize = 600;

/// Default period between sampler ticks.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Default number of failures that trips the breaker open.
pub const DEFAULT_FAIL_THRESHOLD: u32 = 9;

/// Default number of consecutive successes required to close a half-open breaker.
pub const DEFAULT_SUCCESS_NEEDED: u32 = 20;

/// Default outbound queue capacity of each subscriber.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 30;

/// Reconnection backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackoffConfig {
    /// Initial upper bound of the randomised wait.
    pub base: Duration,
    /// Ceiling the upper bound is doubled towards.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            max: Duration::from_millis(60_000),
        }
    }
}

/// Capacities of the bounded channels connecting the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelCapacities {
    /// Connector read loop -> dispatch loop relay.
    pub relay: usize,
    /// Connectors -> price updater.
    pub raw_frames: usize,
    /// Sampler -> correlation engine.
    pub mutations: usize,
    /// Correlation engine -> hub notification.
    pub broadcast: usize,
    /// Handles -> hub control events.
    pub control: usize,
    /// Hub -> each subscriber.
    pub subscriber: usize,
}

impl Default for ChannelCapacities {
    fn default() -> Self {
        Self {
            relay: 100,
            raw_frames: 100,
            mutations: 1,
            broadcast: 1,
            control: 64,
            subscriber: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

/// Configuration for the whole correlation pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub window_size: usize,
    pub sample_period: Duration,
    pub fail_threshold: u32,
    pub success_needed: u32,
    pub backoff: BackoffConfig,
    pub read_timeout: Duration,
    pub channels: ChannelCapacities,
    /// Upstream combined stream base url, the stream list is appended.
    pub base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            sample_period: DEFAULT_SAMPLE_PERIOD,
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            success_needed: DEFAULT_SUCCESS_NEEDED,
            backoff: BackoffConfig::default(),
            read_timeout: crate::streams::timeout::DEFAULT_WS_READ_TIMEOUT,
            channels: ChannelCapacities::default(),
            base_url: BASE_URL_BINANCE_FUTURES_COMBINED.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Set sliding window size (number of samples)
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set sampling period
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    /// Set breaker thresholds
    pub fn with_breaker(mut self, fail_threshold: u32, success_needed: u32) -> Self {
        self.fail_threshold = fail_threshold;
        self.success_needed = success_needed;
        self
    }

    /// Set reconnection backoff
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff = BackoffConfig { base, max };
        self
    }

    /// Set upstream idle read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set subscriber outbound queue capacity
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.channels.subscriber = capacity;
        self
    }

    /// Set all channel capacities
    pub fn with_channels(mut self, channels: ChannelCapacities) -> Self {
        self.channels = channels;
        self
    }

    /// Set upstream base url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Check the configuration describes a runnable pipeline.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.window_size < 2 {
            return Err(DataError::InvalidConfig(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if self.sample_period.is_zero() {
            return Err(DataError::InvalidConfig("sample_period must be non-zero".into()));
        }
        if self.fail_threshold == 0 || self.success_needed == 0 {
            return Err(DataError::InvalidConfig(
                "breaker thresholds must be non-zero".into(),
            ));
        }
        if self.backoff.base.is_zero() || self.backoff.max < self.backoff.base {
            return Err(DataError::InvalidConfig(format!(
                "backoff requires 0 < base <= max, got base={:?} max={:?}",
                self.backoff.base, self.backoff.max
            )));
        }
        if self.read_timeout.is_zero() {
            return Err(DataError::InvalidConfig("read_timeout must be non-zero".into()));
        }

        let ChannelCapacities {
            relay,
            raw_frames,
            mutations,
            broadcast,
            control,
            subscriber,
        } = self.channels;
        if [relay, raw_frames, mutations, broadcast, control, subscriber].contains(&0) {
            return Err(DataError::InvalidConfig(
                "channel capacities must be non-zero".into(),
            ));
        }

        url::Url::parse(&self.base_url)
            .map(|_| ())
            .map_err(|error| DataError::InvalidConfig(format!("base_url: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.window_size, 600);
        assert_eq!(config.sample_period, Duration::from_millis(100));
        assert_eq!(config.fail_threshold, 9);
        assert_eq!(config.success_needed, 20);
        assert_eq!(config.backoff.base, Duration::from_secs(1));
        assert_eq!(config.backoff.max, Duration::from_secs(60));
        assert_eq!(config.channels.subscriber, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::default()
            .with_window_size(5)
            .with_sample_period(Duration::from_millis(10))
            .with_breaker(3, 4)
            .with_subscriber_capacity(2)
            .with_base_url("ws://127.0.0.1:9000/stream?streams=");

        assert_eq!(config.window_size, 5);
        assert_eq!(config.sample_period, Duration::from_millis(10));
        assert_eq!((config.fail_threshold, config.success_needed), (3, 4));
        assert_eq!(config.channels.subscriber, 2);
        assert_eq!(config.base_url, "ws://127.0.0.1:9000/stream?streams=");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate() {
        struct TestCase {
            input: PipelineConfig,
            expected_ok: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: window too small
                input: PipelineConfig::default().with_window_size(1),
                expected_ok: false,
            },
            TestCase {
                // TC1: zero sample period
                input: PipelineConfig::default().with_sample_period(Duration::ZERO),
                expected_ok: false,
            },
            TestCase {
                // TC2: zero breaker threshold
                input: PipelineConfig::default().with_breaker(0, 20),
                expected_ok: false,
            },
            TestCase {
                // TC3: backoff max below base
                input: PipelineConfig::default()
                    .with_backoff(Duration::from_secs(2), Duration::from_secs(1)),
                expected_ok: false,
            },
            TestCase {
                // TC4: zero subscriber capacity
                input: PipelineConfig::default().with_subscriber_capacity(0),
                expected_ok: false,
            },
            TestCase {
                // TC5: unparsable base url
                input: PipelineConfig::default().with_base_url("not a url"),
                expected_ok: false,
            },
            TestCase {
                // TC6: minimal valid window
                input: PipelineConfig::default().with_window_size(2),
                expected_ok: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.validate();
            assert_eq!(actual.is_ok(), test.expected_ok, "TC{} failed: {:?}", index, actual);
        }
    }
}
