//! # Outbound Ports (Driven Ports)
//!
//! The transport plugin contract. Bluetooth, LAN and other transports live
//! outside this crate; all key agreement needs from them is a way to listen
//! for a peer holding a commitment and a way to reach a described endpoint.
//!
//! Testing: `MemoryPlugin` in `adapters`.

use crate::connection::KeyAgreementConnection;
use async_trait::async_trait;
use shared_types::{Commitment, TransportDescriptor, TransportId};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Duplex byte stream produced by a transport.
#[async_trait]
pub trait TransportConnection: AsyncRead + AsyncWrite + Send + Unpin {
    /// Release the underlying resources.
    ///
    /// `exception` is true if the session failed; `recognised` is true if
    /// the remote party was authenticated. Transports may linger or reset
    /// depending on the pair.
    async fn dispose(&mut self, exception: bool, recognised: bool) -> io::Result<()>;
}

/// A bound listener advertising one descriptor.
#[async_trait]
pub trait KeyAgreementListener: Send + Sync {
    /// Descriptor to put in the local payload.
    fn descriptor(&self) -> &TransportDescriptor;

    /// Wait for the next incoming connection.
    async fn accept(&self) -> io::Result<KeyAgreementConnection>;

    /// Stop listening. Pending and later `accept` calls fail.
    fn close(&self);
}

/// A transport that can carry key agreement.
#[async_trait]
pub trait DuplexPlugin: Send + Sync {
    fn id(&self) -> &TransportId;

    /// Upper bound on delivery latency (ms), used to size rotation periods.
    fn max_latency_ms(&self) -> u64;

    fn supports_key_agreement(&self) -> bool {
        true
    }

    /// Start listening for a peer holding `commitment`. `Ok(None)` if the
    /// transport is currently unavailable.
    async fn create_key_agreement_listener(
        &self,
        commitment: &Commitment,
    ) -> io::Result<Option<Box<dyn KeyAgreementListener>>>;

    /// Try once to reach `descriptor`. `Ok(None)` if nobody answered within
    /// `timeout`.
    async fn create_key_agreement_connection(
        &self,
        commitment: &Commitment,
        descriptor: &TransportDescriptor,
        timeout: Duration,
    ) -> io::Result<Option<KeyAgreementConnection>>;
}
