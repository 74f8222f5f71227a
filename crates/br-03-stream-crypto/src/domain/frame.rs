//! Frame layout.
//!
//! ```text
//! [tag: 16, first frame of an initiator only, in the clear]
//! ┌──────────────────────── sealed ────────────────────────┐
//! │ header: 4 │ payload │ padding (zeroes) │                │ MAC: 16
//! └─────────────────────────────────────────┘
//! ```
//!
//! Header: bytes 0..2 hold the payload length as a big-endian `u16` whose top
//! bit is the final-frame flag; bytes 2..4 hold the padding length.
//!
//! Non-final frames always fill `frame_length` bytes on the wire. Only the
//! final frame may be shorter.

use crate::domain::errors::FrameError;
use shared_crypto::{IV_LENGTH, MAC_LENGTH};

/// Length of the encrypted frame header.
pub const HEADER_LENGTH: usize = 4;

/// Default on-the-wire frame length, MAC included.
pub const DEFAULT_FRAME_LENGTH: usize = 1024;

/// Largest frame length the header can describe.
pub const MAX_FRAME_LENGTH: usize = 1 << 15;

/// Smallest usable frame length (one payload byte).
pub const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + MAC_LENGTH + 1;

/// Frames per connection direction: frame numbers are 32-bit.
pub const MAX_FRAMES: u64 = 1 << 32;

const FINAL_FLAG: u16 = 0x8000;

/// Payload bytes that fit in one frame of `frame_length` bytes.
pub fn max_payload_length(frame_length: usize) -> usize {
    frame_length - HEADER_LENGTH - MAC_LENGTH
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_length: usize,
    pub padding_length: usize,
    pub is_final: bool,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        // Lengths are bounded by MAX_FRAME_LENGTH, so both fit in 15 bits.
        let mut payload = self.payload_length as u16;
        if self.is_final {
            payload |= FINAL_FLAG;
        }
        let padding = self.padding_length as u16;
        let mut out = [0u8; HEADER_LENGTH];
        out[..2].copy_from_slice(&payload.to_be_bytes());
        out[2..].copy_from_slice(&padding.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(FrameError::Truncated);
        }
        let payload = u16::from_be_bytes([bytes[0], bytes[1]]);
        let padding = u16::from_be_bytes([bytes[2], bytes[3]]);
        Ok(Self {
            payload_length: usize::from(payload & !FINAL_FLAG),
            padding_length: usize::from(padding),
            is_final: payload & FINAL_FLAG != 0,
        })
    }
}

/// IV for frame `frame_number`.
pub fn frame_iv(frame_number: u32) -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    iv[..4].copy_from_slice(&frame_number.to_be_bytes());
    iv
}

/// Associated data for frame `frame_number` carrying `plaintext_length` bytes.
pub fn frame_aad(frame_number: u32, plaintext_length: usize) -> [u8; 6] {
    let mut aad = [0u8; 6];
    aad[..4].copy_from_slice(&frame_number.to_be_bytes());
    // Plaintext never exceeds MAX_FRAME_LENGTH.
    aad[4..].copy_from_slice(&(plaintext_length as u16).to_be_bytes());
    aad
}
