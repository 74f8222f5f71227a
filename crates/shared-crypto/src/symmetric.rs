//! # Frame Cipher
//!
//! XChaCha20-Poly1305 keyed by a frame key. IVs are supplied by the caller
//! and must never repeat under one key; the frame layer builds them from a
//! monotonically increasing frame number.

use crate::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use shared_types::SecretKey;

/// Length of the XChaCha20 nonce.
pub const IV_LENGTH: usize = 24;

/// Length of the Poly1305 authenticator appended to every ciphertext.
pub const MAC_LENGTH: usize = 16;

/// AEAD cipher bound to one frame key.
pub struct FrameCipher {
    inner: XChaCha20Poly1305,
}

impl FrameCipher {
    pub fn new(key: &SecretKey) -> Self {
        Self {
            inner: XChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt `plaintext`, returning ciphertext with the MAC appended.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if encryption fails.
    pub fn seal(
        &self,
        iv: &[u8; IV_LENGTH],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .encrypt(
                XNonce::from_slice(iv),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Authenticate and decrypt `ciphertext` (MAC included).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` if the MAC does not verify.
    pub fn open(
        &self,
        iv: &[u8; IV_LENGTH],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .decrypt(
                XNonce::from_slice(iv),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
