//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Decryption or authentication failed
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// A secret passed to the KDF was all zeroes (erased or uninitialised)
    #[error("Secret is all zeroes")]
    ZeroSecret,

    /// Rotation period or connection number above the 32-bit range
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Which input overflowed
        field: &'static str,
        /// The rejected value
        value: u64,
    },

    /// Invalid public key (wrong length or low-order point)
    #[error("Invalid public key")]
    InvalidPublicKey,
}

impl From<shared_types::BoundsError> for CryptoError {
    fn from(err: shared_types::BoundsError) -> Self {
        match err {
            shared_types::BoundsError::OutOfRange { field, value } => {
                CryptoError::OutOfRange { field, value }
            }
        }
    }
}
