//! # Node Configuration
//!
//! Unified configuration for every component, built from defaults and
//! overridden by `BR_*` environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BR_CONNECTION_TIMEOUT_SECS` | `connector.connection_timeout` |
//! | `BR_RETRY_INTERVAL_SECS` | `connector.retry_interval` |
//! | `BR_MAX_CLOCK_DIFFERENCE_SECS` | `key_manager.max_clock_difference_ms` |
//! | `BR_ROTATION_CHECK_SECS` | `key_manager.rotation_check_interval_secs` |
//! | `BR_FRAME_LENGTH` | `frame.frame_length` |
//! | `BR_LOG_LEVEL` | `logging.level` |

use br_01_key_agreement::ConnectorConfig;
use br_02_transport_keys::KeyManagerConfig;
use br_03_stream_crypto::domain::{MAX_FRAME_LENGTH, MIN_FRAME_LENGTH};
use br_03_stream_crypto::FrameConfig;
use shared_types::TransportId;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const ENV_CONNECTION_TIMEOUT_SECS: &str = "BR_CONNECTION_TIMEOUT_SECS";
pub const ENV_RETRY_INTERVAL_SECS: &str = "BR_RETRY_INTERVAL_SECS";
pub const ENV_MAX_CLOCK_DIFFERENCE_SECS: &str = "BR_MAX_CLOCK_DIFFERENCE_SECS";
pub const ENV_ROTATION_CHECK_SECS: &str = "BR_ROTATION_CHECK_SECS";
pub const ENV_FRAME_LENGTH: &str = "BR_FRAME_LENGTH";
pub const ENV_LOG_LEVEL: &str = "BR_LOG_LEVEL";

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Key-agreement connection racing.
    pub connector: ConnectorConfig,
    /// Secret rotation.
    pub key_manager: KeyManagerConfig,
    /// Stream frame layout.
    pub frame: FrameConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Replaces the maximum latency a plugin declares for its transport.
    pub transport_latencies: HashMap<TransportId, u64>,
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("{0} must be positive")]
    Zero(&'static str),

    #[error("retry interval {retry:?} must be below connection timeout {timeout:?}")]
    RetryNotBelowTimeout { retry: Duration, timeout: Duration },

    #[error("frame length {length} outside [{min}, {max}]")]
    FrameLength {
        length: usize,
        min: usize,
        max: usize,
    },

    #[error("transport {0}: max latency must be positive")]
    ZeroLatency(TransportId),

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),
}

impl NodeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(secs) = parse_u64(&lookup, ENV_CONNECTION_TIMEOUT_SECS)? {
            config.connector.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, ENV_RETRY_INTERVAL_SECS)? {
            config.connector.retry_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, ENV_MAX_CLOCK_DIFFERENCE_SECS)? {
            config.key_manager.max_clock_difference_ms =
                secs.checked_mul(1000).ok_or(ConfigError::InvalidValue {
                    var: ENV_MAX_CLOCK_DIFFERENCE_SECS,
                    value: secs.to_string(),
                })?;
        }
        if let Some(secs) = parse_u64(&lookup, ENV_ROTATION_CHECK_SECS)? {
            config.key_manager.rotation_check_interval_secs = secs;
        }
        if let Some(length) = parse_u64(&lookup, ENV_FRAME_LENGTH)? {
            config.frame.frame_length =
                usize::try_from(length).map_err(|_| ConfigError::InvalidValue {
                    var: ENV_FRAME_LENGTH,
                    value: length.to_string(),
                })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Short timeouts and small frames for in-process runs.
    pub fn for_testing() -> Self {
        Self {
            connector: ConnectorConfig::for_testing(),
            key_manager: KeyManagerConfig::for_testing(),
            frame: FrameConfig::for_testing(),
            logging: LoggingConfig::default(),
            transport_latencies: HashMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let connector = &self.connector;
        if connector.connection_timeout.is_zero() {
            return Err(ConfigError::Zero("connection timeout"));
        }
        if connector.retry_interval.is_zero() {
            return Err(ConfigError::Zero("retry interval"));
        }
        if connector.data_poll_interval.is_zero() {
            return Err(ConfigError::Zero("data poll interval"));
        }
        if connector.retry_interval >= connector.connection_timeout {
            return Err(ConfigError::RetryNotBelowTimeout {
                retry: connector.retry_interval,
                timeout: connector.connection_timeout,
            });
        }

        if self.key_manager.max_clock_difference_ms == 0 {
            return Err(ConfigError::Zero("max clock difference"));
        }
        if self.key_manager.rotation_check_interval_secs == 0 {
            return Err(ConfigError::Zero("rotation check interval"));
        }

        let length = self.frame.frame_length;
        if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&length) {
            return Err(ConfigError::FrameLength {
                length,
                min: MIN_FRAME_LENGTH,
                max: MAX_FRAME_LENGTH,
            });
        }

        if let Some((transport, _)) = self.transport_latencies.iter().find(|(_, l)| **l == 0) {
            return Err(ConfigError::ZeroLatency(transport.clone()));
        }

        if EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }
        Ok(())
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
