//! # Payload Wire Format
//!
//! ```text
//! [version:1][commitment:16][count:u16 BE]
//!   { [transport:u32 BE][length:u16 BE][descriptor:length] } * count
//! ```
//!
//! Only transports with a known wire identifier survive parsing; the rest
//! are dropped so newer peers can advertise transports we lack.

use super::errors::PayloadError;
use super::record::PROTOCOL_VERSION;
use shared_types::{Commitment, Payload, TransportDescriptor, TransportId, COMMIT_LENGTH};
use std::cmp::Ordering;

pub const BLUETOOTH_WIRE_ID: u32 = 0;
pub const LAN_WIRE_ID: u32 = 1;

pub const BLUETOOTH_TRANSPORT: &str = "bluetooth";
pub const LAN_TRANSPORT: &str = "lan";

fn wire_id(transport: &TransportId) -> Option<u32> {
    match transport.as_str() {
        BLUETOOTH_TRANSPORT => Some(BLUETOOTH_WIRE_ID),
        LAN_TRANSPORT => Some(LAN_WIRE_ID),
        _ => None,
    }
}

fn transport_for(wire: u32) -> Option<TransportId> {
    match wire {
        BLUETOOTH_WIRE_ID => Some(TransportId::new(BLUETOOTH_TRANSPORT)),
        LAN_WIRE_ID => Some(TransportId::new(LAN_TRANSPORT)),
        _ => None,
    }
}

/// Whether `transport` can be advertised in a payload.
pub fn is_advertisable(transport: &TransportId) -> bool {
    wire_id(transport).is_some()
}

pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, PayloadError> {
    let descriptors = payload.descriptors();
    let count = u16::try_from(descriptors.len())
        .map_err(|_| PayloadError::TooLong(descriptors.len()))?;

    let mut out = Vec::with_capacity(1 + COMMIT_LENGTH + 2);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(payload.commitment().as_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    for d in descriptors {
        let id = wire_id(&d.transport)
            .ok_or_else(|| PayloadError::UnknownTransport(d.transport.to_string()))?;
        let len = u16::try_from(d.descriptor.len())
            .map_err(|_| PayloadError::TooLong(d.descriptor.len()))?;
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&d.descriptor);
    }
    Ok(out)
}

struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], PayloadError> {
        if self.bytes.len() < n {
            return Err(PayloadError::Truncated);
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u16(&mut self) -> Result<u16, PayloadError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, PayloadError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

pub fn decode_payload(bytes: &[u8]) -> Result<Payload, PayloadError> {
    let mut cursor = Cursor { bytes };
    let version = cursor.take(1)?[0];
    if version != PROTOCOL_VERSION {
        return Err(PayloadError::UnsupportedVersion(version));
    }
    let mut commit = [0u8; COMMIT_LENGTH];
    commit.copy_from_slice(cursor.take(COMMIT_LENGTH)?);

    let count = cursor.u16()?;
    let mut descriptors = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let id = cursor.u32()?;
        let len = cursor.u16()?;
        let descriptor = cursor.take(usize::from(len))?;
        if let Some(transport) = transport_for(id) {
            descriptors.push(TransportDescriptor::new(transport, descriptor.to_vec()));
        }
    }
    if !cursor.bytes.is_empty() {
        return Err(PayloadError::TrailingBytes(cursor.bytes.len()));
    }
    Ok(Payload::new(Commitment(commit), descriptors))
}

/// Handshake role, fixed by comparing the two payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Alice,
    Bob,
}

impl Role {
    /// The smaller payload is Alice. `None` if the payloads are equal.
    pub fn assign(ours: &Payload, theirs: &Payload) -> Option<Self> {
        match ours.cmp(theirs) {
            Ordering::Less => Some(Self::Alice),
            Ordering::Greater => Some(Self::Bob),
            Ordering::Equal => None,
        }
    }

    pub fn is_alice(self) -> bool {
        self == Self::Alice
    }
}
