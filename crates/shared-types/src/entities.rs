//! # Core Entities
//!
//! Identifiers for contacts and transports, the endpoint anchor from which a
//! rotation schedule is computed, and the per-connection context handed to
//! the stream layer.

use crate::secrets::SecretKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a recognition tag in bytes.
pub const TAG_LENGTH: usize = 16;

/// A precomputed recognition tag.
pub type Tag = [u8; TAG_LENGTH];

/// Local identifier of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContactId(pub u32);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable name of a transport, e.g. `"bluetooth"` or `"lan"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransportId(String);

impl TransportId {
    /// Create a transport identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anchor for the secret schedule of one (contact, transport) pair.
///
/// `epoch` is in milliseconds since the Unix epoch. `alice` records which
/// role this device played in the key agreement that produced the secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub contact: ContactId,
    pub transport: TransportId,
    pub epoch: u64,
    pub alice: bool,
}

impl Endpoint {
    pub fn new(contact: ContactId, transport: TransportId, epoch: u64, alice: bool) -> Self {
        Self {
            contact,
            transport,
            epoch,
            alice,
        }
    }

    /// Key used to index secrets belonging to this endpoint.
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            contact: self.contact,
            transport: self.transport.clone(),
        }
    }
}

/// (contact, transport) pair used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub contact: ContactId,
    pub transport: TransportId,
}

/// Everything the stream layer needs to encrypt or decrypt one connection.
///
/// The secret is a clone owned by the context; whoever consumes the context
/// is responsible for dropping it once the stream keys have been derived.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub contact: ContactId,
    pub transport: TransportId,
    pub secret: SecretKey,
    pub connection: u32,
    pub alice: bool,
}
