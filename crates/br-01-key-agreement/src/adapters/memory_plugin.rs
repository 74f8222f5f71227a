//! # In-Memory Duplex Plugin
//!
//! Transports backed by `tokio::io::duplex` pipes on a shared
//! [`MemoryNetwork`]. Descriptors are plain address bytes; a listener only
//! accepts callers presenting the commitment it was created with.
//!
//! Used by the test suites and the loopback demo in the node binary.

use crate::connection::KeyAgreementConnection;
use crate::ports::{DuplexPlugin, KeyAgreementListener, TransportConnection};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Commitment, TransportDescriptor, TransportId};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tracing::debug;

const PIPE_BUFFER: usize = 64 * 1024;

/// How a connection was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposal {
    pub exception: bool,
    pub recognised: bool,
}

/// Shared log of disposals, for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryDisposals {
    inner: Arc<Mutex<Vec<Disposal>>>,
}

impl MemoryDisposals {
    fn record(&self, disposal: Disposal) {
        self.inner.lock().push(disposal);
    }

    pub fn count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn all(&self, predicate: impl Fn(&Disposal) -> bool) -> bool {
        self.inner.lock().iter().all(predicate)
    }

    pub fn snapshot(&self) -> Vec<Disposal> {
        self.inner.lock().clone()
    }
}

/// One end of an in-memory pipe.
#[derive(Debug)]
pub struct MemoryConnection {
    stream: DuplexStream,
    disposals: MemoryDisposals,
    disposed: bool,
}

impl MemoryConnection {
    /// Two connected ends sharing one disposal log.
    pub fn pair(disposals: MemoryDisposals, buffer: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(buffer);
        (
            Self {
                stream: a,
                disposals: disposals.clone(),
                disposed: false,
            },
            Self {
                stream: b,
                disposals,
                disposed: false,
            },
        )
    }
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn dispose(&mut self, exception: bool, recognised: bool) -> io::Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.disposals.record(Disposal {
            exception,
            recognised,
        });
        self.stream.shutdown().await
    }
}

impl AsyncRead for MemoryConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConnection {
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

struct Binding {
    commitment: Commitment,
    incoming: mpsc::UnboundedSender<KeyAgreementConnection>,
}

/// Address space shared by every plugin attached to it.
#[derive(Default)]
pub struct MemoryNetwork {
    bindings: Mutex<HashMap<(TransportId, Vec<u8>), Binding>>,
    disposals: MemoryDisposals,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every disposal of a connection created on this network.
    pub fn disposals(&self) -> &MemoryDisposals {
        &self.disposals
    }

    pub fn is_bound(&self, transport: &TransportId, address: &[u8]) -> bool {
        self.bindings
            .lock()
            .contains_key(&(transport.clone(), address.to_vec()))
    }

    fn unbind(&self, transport: &TransportId, address: &[u8]) {
        self.bindings
            .lock()
            .remove(&(transport.clone(), address.to_vec()));
    }
}

pub struct MemoryListener {
    descriptor: TransportDescriptor,
    network: Arc<MemoryNetwork>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<KeyAgreementConnection>>,
}

#[async_trait]
impl KeyAgreementListener for MemoryListener {
    fn descriptor(&self) -> &TransportDescriptor {
        &self.descriptor
    }

    async fn accept(&self) -> io::Result<KeyAgreementConnection> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionAborted, "listener closed"))
    }

    fn close(&self) {
        self.network
            .unbind(&self.descriptor.transport, &self.descriptor.descriptor);
    }
}

/// Plugin for one transport on a [`MemoryNetwork`].
pub struct MemoryPlugin {
    id: TransportId,
    address: Vec<u8>,
    max_latency_ms: u64,
    network: Arc<MemoryNetwork>,
    refusals: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemoryPlugin {
    pub fn new(
        network: Arc<MemoryNetwork>,
        id: TransportId,
        address: impl Into<Vec<u8>>,
        max_latency_ms: u64,
    ) -> Self {
        Self {
            id,
            address: address.into(),
            max_latency_ms,
            network,
            refusals: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` outgoing attempts find nobody listening.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    /// Outgoing attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DuplexPlugin for MemoryPlugin {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn max_latency_ms(&self) -> u64 {
        self.max_latency_ms
    }

    async fn create_key_agreement_listener(
        &self,
        commitment: &Commitment,
    ) -> io::Result<Option<Box<dyn KeyAgreementListener>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = (self.id.clone(), self.address.clone());
        {
            let mut bindings = self.network.bindings.lock();
            if bindings.contains_key(&key) {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"));
            }
            bindings.insert(
                key,
                Binding {
                    commitment: *commitment,
                    incoming: tx,
                },
            );
        }
        Ok(Some(Box::new(MemoryListener {
            descriptor: TransportDescriptor::new(self.id.clone(), self.address.clone()),
            network: self.network.clone(),
            incoming: tokio::sync::Mutex::new(rx),
        })))
    }

    async fn create_key_agreement_connection(
        &self,
        commitment: &Commitment,
        descriptor: &TransportDescriptor,
        _timeout: Duration,
    ) -> io::Result<Option<KeyAgreementConnection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            debug!(transport = %self.id, "Refusing connection attempt");
            return Ok(None);
        }

        let sender = {
            let bindings = self.network.bindings.lock();
            match bindings.get(&(descriptor.transport.clone(), descriptor.descriptor.clone())) {
                Some(binding) if binding.commitment == *commitment => binding.incoming.clone(),
                _ => return Ok(None),
            }
        };
        let (ours, theirs) = MemoryConnection::pair(self.network.disposals.clone(), PIPE_BUFFER);
        let accepted = KeyAgreementConnection::new(descriptor.transport.clone(), Box::new(theirs));
        if sender.send(accepted).is_err() {
            return Ok(None);
        }
        Ok(Some(KeyAgreementConnection::new(
            self.id.clone(),
            Box::new(ours),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn lan(network: &Arc<MemoryNetwork>, address: &str) -> MemoryPlugin {
        MemoryPlugin::new(network.clone(), TransportId::new("lan"), address, 1_000)
    }

    #[tokio::test]
    async fn test_connect_reaches_listener() {
        let network = MemoryNetwork::new();
        let bob = lan(&network, "bob");
        let alice = lan(&network, "alice");
        let commitment = Commitment([3; 16]);

        let listener = bob
            .create_key_agreement_listener(&commitment)
            .await
            .unwrap()
            .unwrap();
        let mut outgoing = alice
            .create_key_agreement_connection(
                &commitment,
                listener.descriptor(),
                Duration::from_secs(1),
            )
            .await
            .unwrap()
            .unwrap();
        let mut incoming = listener.accept().await.unwrap();

        outgoing.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        incoming.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_wrong_commitment_not_connected() {
        let network = MemoryNetwork::new();
        let bob = lan(&network, "bob");
        let listener = bob
            .create_key_agreement_listener(&Commitment([1; 16]))
            .await
            .unwrap()
            .unwrap();
        let result = lan(&network, "alice")
            .create_key_agreement_connection(
                &Commitment([2; 16]),
                listener.descriptor(),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_close_unbinds_and_fails_accept() {
        let network = MemoryNetwork::new();
        let bob = lan(&network, "bob");
        let listener = bob
            .create_key_agreement_listener(&Commitment([1; 16]))
            .await
            .unwrap()
            .unwrap();
        assert!(network.is_bound(&TransportId::new("lan"), b"bob"));
        listener.close();
        assert!(!network.is_bound(&TransportId::new("lan"), b"bob"));
        assert!(listener.accept().await.is_err());
    }

    #[tokio::test]
    async fn test_refusals_are_counted() {
        let network = MemoryNetwork::new();
        let alice = lan(&network, "alice");
        alice.refuse_next(1);
        let descriptor = TransportDescriptor::new(TransportId::new("lan"), b"nobody".to_vec());
        let commitment = Commitment([0; 16]);
        for _ in 0..2 {
            let result = alice
                .create_key_agreement_connection(&commitment, &descriptor, Duration::from_secs(1))
                .await
                .unwrap();
            assert!(result.is_none());
        }
        assert_eq!(alice.attempts(), 2);
    }
}
