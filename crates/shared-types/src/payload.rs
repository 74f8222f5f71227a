//! # Key-Agreement Payload
//!
//! The payload each device advertises (typically as a QR code) before key
//! agreement: a commitment to its ephemeral public key and the list of
//! transports it is listening on.

use crate::entities::TransportId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Length of a public-key commitment in bytes.
pub const COMMIT_LENGTH: usize = 16;

/// Truncated hash of an ephemeral public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; COMMIT_LENGTH]);

impl Commitment {
    pub fn as_bytes(&self) -> &[u8; COMMIT_LENGTH] {
        &self.0
    }
}

/// Where and how a peer can be reached over one transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransportDescriptor {
    pub transport: TransportId,
    /// Transport-specific address bytes; opaque to everything but the plugin.
    pub descriptor: Vec<u8>,
}

impl TransportDescriptor {
    pub fn new(transport: TransportId, descriptor: Vec<u8>) -> Self {
        Self {
            transport,
            descriptor,
        }
    }
}

/// Immutable advertisement exchanged before key agreement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload {
    commitment: Commitment,
    descriptors: Vec<TransportDescriptor>,
}

impl Payload {
    pub fn new(commitment: Commitment, descriptors: Vec<TransportDescriptor>) -> Self {
        Self {
            commitment,
            descriptors,
        }
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    /// Descriptors in order of preference.
    pub fn descriptors(&self) -> &[TransportDescriptor] {
        &self.descriptors
    }
}

/// Total order used to assign handshake roles without negotiation.
///
/// Commitments decide; descriptors only break ties between payloads that
/// would otherwise be indistinguishable.
impl Ord for Payload {
    fn cmp(&self, other: &Self) -> Ordering {
        self.commitment
            .cmp(&other.commitment)
            .then_with(|| self.descriptors.cmp(&other.descriptors))
    }
}

impl PartialOrd for Payload {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(first: u8) -> Payload {
        let mut commit = [0u8; COMMIT_LENGTH];
        commit[0] = first;
        Payload::new(
            Commitment(commit),
            vec![TransportDescriptor::new(TransportId::new("lan"), vec![1, 2])],
        )
    }

    #[test]
    fn test_order_follows_commitment() {
        assert!(payload(1) < payload(2));
        assert!(payload(9) > payload(2));
        assert_eq!(payload(3).cmp(&payload(3)), Ordering::Equal);
    }

    #[test]
    fn test_descriptors_break_ties() {
        let a = payload(5);
        let b = Payload::new(*a.commitment(), Vec::new());
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }
}
