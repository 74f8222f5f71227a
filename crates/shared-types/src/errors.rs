//! # Error Types
//!
//! Errors shared by every subsystem that handles connection numbers and
//! rotation periods.

use thiserror::Error;

/// Largest value a rotation period or connection number may take.
pub const MAX_32_BIT_UNSIGNED: u64 = u32::MAX as u64;

/// A counter left the unsigned 32-bit range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsError {
    /// Value does not fit in 32 bits.
    #[error("{field} out of range: {value} exceeds {max}", max = MAX_32_BIT_UNSIGNED)]
    OutOfRange {
        /// Which counter overflowed.
        field: &'static str,
        /// The rejected value.
        value: u64,
    },
}

/// Narrow a persisted or computed counter to 32 bits.
pub fn check_u32(field: &'static str, value: u64) -> Result<u32, BoundsError> {
    u32::try_from(value).map_err(|_| BoundsError::OutOfRange { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_u32_accepts_max() {
        assert_eq!(check_u32("period", MAX_32_BIT_UNSIGNED), Ok(u32::MAX));
    }

    #[test]
    fn test_check_u32_rejects_overflow() {
        let err = check_u32("connection", MAX_32_BIT_UNSIGNED + 1).unwrap_err();
        assert_eq!(
            err,
            BoundsError::OutOfRange {
                field: "connection",
                value: MAX_32_BIT_UNSIGNED + 1
            }
        );
        assert!(err.to_string().contains("connection"));
    }
}
