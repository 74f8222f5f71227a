//! # Key Manager Configuration

use crate::domain::KeyManagerError;
use std::time::Duration;

/// Key manager configuration. Times are in milliseconds unless named
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyManagerConfig {
    /// Largest clock difference tolerated between two contacts.
    pub max_clock_difference_ms: u64,

    /// How often the rotation timer rebuilds the secret buckets.
    pub rotation_check_interval_secs: u64,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            max_clock_difference_ms: 60 * 60 * 1000,
            rotation_check_interval_secs: 60,
        }
    }
}

impl KeyManagerConfig {
    /// Short periods so tests can cross several rotations.
    pub fn for_testing() -> Self {
        Self {
            max_clock_difference_ms: 1_000,
            rotation_check_interval_secs: 1,
        }
    }

    pub fn rotation_check_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_check_interval_secs)
    }

    pub fn validate(&self) -> Result<(), KeyManagerError> {
        if self.max_clock_difference_ms == 0 {
            return Err(KeyManagerError::InvalidConfig(
                "max_clock_difference_ms must be positive",
            ));
        }
        if self.rotation_check_interval_secs == 0 {
            return Err(KeyManagerError::InvalidConfig(
                "rotation_check_interval_secs must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KeyManagerConfig::default();
        assert_eq!(config.max_clock_difference_ms, 3_600_000);
        assert_eq!(config.rotation_check_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = KeyManagerConfig::for_testing();
        config.rotation_check_interval_secs = 0;
        assert!(config.validate().is_err());
        config = KeyManagerConfig::for_testing();
        config.max_clock_difference_ms = 0;
        assert!(config.validate().is_err());
    }
}
