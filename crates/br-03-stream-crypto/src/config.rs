//! Frame layer configuration.

use crate::domain::{FrameError, DEFAULT_FRAME_LENGTH, MAX_FRAME_LENGTH, MIN_FRAME_LENGTH};

/// Configuration shared by both directions of every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// On-the-wire length of every non-final frame, MAC included.
    pub frame_length: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_length: DEFAULT_FRAME_LENGTH,
        }
    }
}

impl FrameConfig {
    /// Small frames so tests cross frame boundaries quickly.
    pub fn for_testing() -> Self {
        Self { frame_length: 64 }
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&self.frame_length) {
            return Err(FrameError::InvalidFrameLength(self.frame_length));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(FrameConfig::default().validate().is_ok());
        assert!(FrameConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_bounds() {
        let too_small = FrameConfig {
            frame_length: MIN_FRAME_LENGTH - 1,
        };
        let too_large = FrameConfig {
            frame_length: MAX_FRAME_LENGTH + 1,
        };
        assert!(too_small.validate().is_err());
        assert!(too_large.validate().is_err());
    }
}
