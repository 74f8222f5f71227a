//! # Secret Material
//!
//! [`SecretKey`] is the only type used to carry key material between
//! subsystems. It is zeroed on drop, compares in constant time and never
//! reveals its bytes through `Debug`.
//!
//! [`TemporarySecret`] is the persisted record for one rotation period of
//! one endpoint.

use crate::entities::{ContactId, Endpoint, EndpointKey, TransportId};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Length of every secret and derived key, in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Erasable 256-bit secret.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey([u8; SECRET_KEY_LENGTH]);

impl SecretKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Copy from a slice, returning `None` if the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; SECRET_KEY_LENGTH] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LENGTH] {
        &self.0
    }

    /// True if every byte is zero (an erased or never-initialised key).
    pub fn is_all_zero(&self) -> bool {
        self.0.ct_eq(&[0u8; SECRET_KEY_LENGTH]).into()
    }

    /// Overwrite the key with zeroes in place.
    pub fn erase(&mut self) {
        self.0.zeroize();
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Secret for one rotation period of one endpoint, as persisted.
///
/// `window_centre` and `window_bitmap` are the persisted form of the
/// incoming connection window; `outgoing_connections` is the next
/// connection number to hand out for outgoing streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporarySecret {
    pub endpoint: Endpoint,
    pub period: u32,
    pub secret: SecretKey,
    pub outgoing_connections: u64,
    pub window_centre: u64,
    pub window_bitmap: u32,
}

impl TemporarySecret {
    /// Fresh secret with an empty window and no outgoing connections.
    pub fn new(endpoint: Endpoint, period: u32, secret: SecretKey) -> Self {
        Self {
            endpoint,
            period,
            secret,
            outgoing_connections: 0,
            window_centre: 0,
            window_bitmap: 0,
        }
    }

    pub fn contact(&self) -> ContactId {
        self.endpoint.contact
    }

    pub fn transport(&self) -> &TransportId {
        &self.endpoint.transport
    }

    pub fn alice(&self) -> bool {
        self.endpoint.alice
    }

    pub fn key(&self) -> EndpointKey {
        self.endpoint.key()
    }
}
