//! # Domain Errors
//!
//! Error types for the transport key subsystem.
//!
//! "Not ready" outcomes (no outgoing secret yet, tag not recognised) are
//! `Ok(None)` results, never errors. Everything here is either a
//! persistence failure or a caller breaking a contract.

use shared_crypto::CryptoError;
use shared_types::{BoundsError, ContactId, TransportId};
use thiserror::Error;

/// Failures reported by a [`SecretStore`](crate::ports::SecretStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record for this (contact, transport, period).
    #[error("no secret stored for contact {contact} on {transport}, period {period}")]
    SecretNotFound {
        contact: ContactId,
        transport: TransportId,
        period: u32,
    },

    /// The backing store failed.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Errors raised by the connection recogniser and its windows.
#[derive(Debug, Error)]
pub enum RecogniserError {
    /// Connection number outside the window being updated.
    #[error("connection {connection} is outside the window starting at {base}")]
    NotInWindow { connection: u64, base: u64 },

    /// Connection number already marked seen.
    #[error("connection {connection} was already seen")]
    AlreadySeen { connection: u64 },

    /// Persisted window centre beyond the 32-bit connection range.
    #[error("window centre {0} is out of range")]
    InvalidWindow(u64),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the key manager.
#[derive(Debug, Error)]
pub enum KeyManagerError {
    /// A secret or endpoint refers to a transport with no declared latency.
    #[error("no maximum latency recorded for transport {0}")]
    MissingLatency(TransportId),

    /// `2 * max_clock_difference + latency` is zero or overflows.
    #[error("invalid rotation period (clock difference {max_clock_difference} ms, latency {latency} ms)")]
    InvalidRotationPeriod {
        max_clock_difference: u64,
        latency: u64,
    },

    /// A new endpoint must be at least one rotation period old.
    #[error("endpoint epoch {epoch} is less than one rotation period before {now}")]
    EpochTooRecent { epoch: u64, now: u64 },

    /// Secrets already exist for this (contact, transport).
    #[error("endpoint already known: contact {contact} on {transport}")]
    DuplicateEndpoint {
        contact: ContactId,
        transport: TransportId,
    },

    #[error("key manager already started")]
    AlreadyStarted,

    #[error("invalid key manager configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Recogniser(#[from] RecogniserError),
}
