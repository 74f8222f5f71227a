//! Frame layer errors.

use shared_crypto::CryptoError;
use thiserror::Error;

/// Errors raised while encrypting or decrypting a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Stream ended in the middle of a frame header or tag.
    #[error("Truncated frame")]
    Truncated,

    /// Stream ended before the final frame was read.
    #[error("Unexpected end of stream before final frame")]
    UnexpectedEnd,

    /// A frame shorter than the frame length was not marked final.
    #[error("Short non-final frame: {length} bytes")]
    ShortNonFinalFrame { length: usize },

    /// MAC verification failed.
    #[error("Frame authentication failed")]
    BadMac,

    /// Declared payload and padding do not match the decrypted length.
    #[error("Invalid frame header: payload {payload} + padding {padding} != {available}")]
    InvalidHeader {
        payload: usize,
        padding: usize,
        available: usize,
    },

    /// Padding contained a non-zero byte.
    #[error("Non-zero padding")]
    NonZeroPadding,

    /// Payload longer than a frame can hold.
    #[error("Payload too long: {length} > {max}")]
    PayloadTooLong { length: usize, max: usize },

    /// Caller's buffer cannot hold the frame payload.
    #[error("Buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Write attempted after the final frame.
    #[error("Stream already finished")]
    AfterFinal,

    /// All 2^32 frame numbers have been used.
    #[error("Frame counter exhausted")]
    FrameCounterExhausted,

    /// Frame would exceed the transport's byte budget.
    #[error("Transport capacity exceeded: need {needed}, remaining {remaining}")]
    CapacityExceeded { needed: u64, remaining: u64 },

    /// Frame length outside the supported range.
    #[error("Invalid frame length: {0}")]
    InvalidFrameLength(usize),

    /// Key or tag derivation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Underlying transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
