//! Key-agreement error types.

use shared_crypto::CryptoError;
use std::io;
use thiserror::Error;

/// Why a handshake was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortKind {
    #[error("public key does not match commitment")]
    BadCommitment,
    #[error("confirmation record mismatch")]
    BadConfirmation,
    #[error("protocol version mismatch")]
    VersionMismatch,
    #[error("unexpected record type")]
    UnexpectedRecord,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("malformed record")]
    Malformed,
    #[error("peer aborted")]
    PeerAborted,
}

/// Payload encoding and parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload truncated")]
    Truncated,
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    #[error("transport {0} has no wire identifier")]
    UnknownTransport(String),
    #[error("field too long: {0} bytes")]
    TooLong(usize),
}

/// Errors raised by the connector, protocol and task.
#[derive(Debug, Error)]
pub enum KeyAgreementError {
    /// Authentication or protocol failure. `received` is true if the peer
    /// sent the abort rather than this side detecting it.
    #[error("handshake aborted: {kind}")]
    Abort { kind: AbortKind, received: bool },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connect called before listen")]
    NotListening,

    #[error("already listening")]
    AlreadyListening,

    #[error("key agreement stopped")]
    Stopped,

    /// No transport produced a usable connection before the deadline.
    #[error("no connection established")]
    NoConnection,

    /// Both payloads are identical, typically our own code scanned back.
    #[error("remote payload equals our own")]
    OwnPayload,

    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl KeyAgreementError {
    /// Abort detected locally.
    pub fn abort(kind: AbortKind) -> Self {
        Self::Abort {
            kind,
            received: false,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort { .. })
    }

    /// True for an abort record sent by the peer.
    pub fn is_received_abort(&self) -> bool {
        matches!(self, Self::Abort { received: true, .. })
    }
}
