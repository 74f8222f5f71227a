//! # Handshake Records
//!
//! ```text
//! ┌─────────┬──────┬────────────────┬─────────────────┐
//! │ version │ type │ length (u16 BE)│ payload[length] │
//! │   1 B   │ 1 B  │      2 B       │                 │
//! └─────────┴──────┴────────────────┴─────────────────┘
//! ```
//!
//! Types other than `KEY`, `CONFIRM` and `ABORT` are skipped by readers.

/// Version byte carried by every record and payload.
pub const PROTOCOL_VERSION: u8 = 4;

pub const RECORD_HEADER_LENGTH: usize = 4;

pub const MAX_RECORD_PAYLOAD_LENGTH: usize = u16::MAX as usize;

/// Record types understood by this version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    Key = 0,
    Confirm = 1,
    Abort = 2,
}

impl RecordType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Key),
            1 => Some(Self::Confirm),
            2 => Some(Self::Abort),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub version: u8,
    pub record_type: u8,
    pub length: u16,
}

impl RecordHeader {
    pub fn parse(bytes: &[u8; RECORD_HEADER_LENGTH]) -> Self {
        Self {
            version: bytes[0],
            record_type: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_LENGTH] {
        let len = self.length.to_be_bytes();
        [self.version, self.record_type, len[0], len[1]]
    }
}
