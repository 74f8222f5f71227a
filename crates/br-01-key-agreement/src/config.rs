//! # Connector Configuration

use crate::domain::KeyAgreementError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Deadline for the whole connection race.
    pub connection_timeout: Duration,

    /// Pause between connection attempts over one transport.
    pub retry_interval: Duration,

    /// How long the responder waits for data before re-checking the role
    /// and announcing that it is waiting.
    pub data_poll_interval: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(60),
            retry_interval: Duration::from_secs(2),
            data_poll_interval: Duration::from_millis(100),
        }
    }
}

impl ConnectorConfig {
    /// Short timeouts for in-memory transports.
    pub fn for_testing() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(50),
            data_poll_interval: Duration::from_millis(10),
        }
    }

    pub fn validate(&self) -> Result<(), KeyAgreementError> {
        if self.connection_timeout.is_zero() {
            return Err(KeyAgreementError::InvalidConfig(
                "connection_timeout must be positive",
            ));
        }
        if self.retry_interval.is_zero() || self.retry_interval >= self.connection_timeout {
            return Err(KeyAgreementError::InvalidConfig(
                "retry_interval must be positive and below connection_timeout",
            ));
        }
        if self.data_poll_interval.is_zero() {
            return Err(KeyAgreementError::InvalidConfig(
                "data_poll_interval must be positive",
            ));
        }
        Ok(())
    }
}
