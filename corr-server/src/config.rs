use corr_data::config::PipelineConfig;
use std::{net::SocketAddr, str::FromStr, time::Duration};
use thiserror::Error;

/// Default listen address, configurable via `WS_ADDR`.
pub const DEFAULT_WS_ADDR: &str = "0.0.0.0:8080";

/// Origins accepted when `ALLOWED_ORIGINS` is not set.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:3000",
];

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration read from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub json_logs: bool,
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = parse_or(&lookup, "WS_ADDR", || {
            SocketAddr::from_str(DEFAULT_WS_ADDR).map_err(|error| error.to_string())
        })?;

        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            Some(origins) => origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|origin| origin.to_string()).collect(),
        };

        let json_logs = lookup("LOG_FORMAT").is_some_and(|format| format.eq_ignore_ascii_case("json"));

        let defaults = PipelineConfig::default();
        let mut pipeline = defaults
            .clone()
            .with_window_size(parse_or(&lookup, "CORR_WINDOW_SIZE", || Ok(defaults.window_size))?)
            .with_sample_period(Duration::from_millis(parse_or(
                &lookup,
                "CORR_SAMPLE_PERIOD_MS",
                || Ok(defaults.sample_period.as_millis() as u64),
            )?))
            .with_breaker(
                parse_or(&lookup, "CORR_FAIL_THRESHOLD", || Ok(defaults.fail_threshold))?,
                parse_or(&lookup, "CORR_SUCCESS_NEEDED", || Ok(defaults.success_needed))?,
            )
            .with_read_timeout(Duration::from_secs(parse_or(
                &lookup,
                "CORR_READ_TIMEOUT_SECS",
                || Ok(defaults.read_timeout.as_secs()),
            )?))
            .with_subscriber_capacity(parse_or(&lookup, "CORR_SUBSCRIBER_BUFFER", || {
                Ok(defaults.channels.subscriber)
            })?);

        if let Some(base_url) = lookup("CORR_BASE_URL") {
            pipeline = pipeline.with_base_url(base_url);
        }

        pipeline
            .validate()
            .map_err(|error| ConfigError::InvalidValue {
                key: "CORR_*",
                value: format!("{pipeline:?}"),
                reason: error.to_string(),
            })?;

        Ok(Self {
            addr,
            allowed_origins,
            json_logs,
            pipeline,
        })
    }
}

fn parse_or<F, T, D>(lookup: &F, key: &'static str, default: D) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, String>,
{
    match lookup(key) {
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|error| ConfigError::InvalidValue {
                key,
                reason: error.to_string(),
                value,
            })
        }
        None => default().map_err(|reason| ConfigError::InvalidValue {
            key,
            value: String::new(),
            reason,
        }),
    }
}
