//! # Key-Agreement Connection
//!
//! A candidate connection and the transport it arrived on. Exactly one stage
//! owns it at a time (chooser, connector, protocol, caller), and whoever
//! drops it out of the race must call [`KeyAgreementConnection::dispose`].

use crate::ports::TransportConnection;
use shared_types::TransportId;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tracing::warn;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub struct KeyAgreementConnection {
    id: u64,
    transport: TransportId,
    stream: BufReader<Box<dyn TransportConnection>>,
}

impl KeyAgreementConnection {
    pub fn new(transport: TransportId, stream: Box<dyn TransportConnection>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            stream: BufReader::new(stream),
        }
    }

    /// Process-unique identity, used to tell candidates apart in logs.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn transport(&self) -> &TransportId {
        &self.transport
    }

    /// Wait until at least one byte can be read without consuming it.
    ///
    /// Cancel-safe: bytes already pulled from the transport stay buffered.
    pub async fn wait_readable(&mut self) -> io::Result<()> {
        let buffered = self.stream.fill_buf().await?;
        if buffered.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before any data",
            ));
        }
        Ok(())
    }

    /// Release the connection, logging rather than returning failures.
    pub async fn dispose(self, exception: bool, recognised: bool) {
        let id = self.id;
        let transport = self.transport;
        let mut inner = self.stream.into_inner();
        if let Err(e) = inner.dispose(exception, recognised).await {
            warn!(
                connection = id,
                transport = %transport,
                error = %e,
                "Failed to dispose connection"
            );
        }
    }
}

impl fmt::Debug for KeyAgreementConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAgreementConnection")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for KeyAgreementConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for KeyAgreementConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
