//! # Key-Agreement Connector
//!
//! Races every way of reaching the peer and hands the first usable
//! connection to the protocol.
//!
//! ```text
//!  listen(key pair)                      connect(remote payload, role)
//!    │                                      │
//!    ├─ listener per plugin ─► accept ─┐    ├─ retrying connect per descriptor ─┐
//!    │                                 ▼    │                                   ▼
//!    │                       wait for role, and for data when Bob               │
//!    │                                 │                                        │
//!    └─────────────────────────────────┴──────────► ConnectionChooser ◄─────────┘
//!                                                        │ poll(deadline)
//!                                                        ▼
//!                                               winner, everything else closed
//! ```
//!
//! The responder only accepts connections that already carry data, since
//! the initiator speaks first on the connection it picked. The first time an
//! accepted responder candidate sits idle a `Waiting` event is published.

use crate::chooser::ConnectionChooser;
use crate::config::ConnectorConfig;
use crate::connection::KeyAgreementConnection;
use crate::domain::{is_advertisable, KeyAgreementError, Role};
use crate::notifier::Notifier;
use crate::ports::{DuplexPlugin, KeyAgreementListener};
use parking_lot::Mutex;
use shared_crypto::{derive_commitment, AgreementKeyPair};
use shared_types::{Commitment, Payload, TransportDescriptor};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Resolves once `stop` reads true or its sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        let done = *stop.borrow_and_update();
        if done || stop.changed().await.is_err() {
            return;
        }
    }
}

/// Fixed-interval retry bounded by a deadline and the stop signal.
struct Retry {
    interval: Duration,
    deadline: Instant,
    stop: watch::Receiver<bool>,
}

impl Retry {
    /// Time left for another attempt, or `None` if out of time or stopped.
    fn remaining(&self) -> Option<Duration> {
        if *self.stop.borrow() {
            return None;
        }
        let left = self.deadline.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    /// Sleep until the next attempt. False if the deadline or a stop came
    /// first.
    async fn pause(&mut self) -> bool {
        let wake = (Instant::now() + self.interval).min(self.deadline);
        tokio::select! {
            _ = tokio::time::sleep_until(wake) => self.remaining().is_some(),
            _ = stopped(&mut self.stop) => false,
        }
    }
}

/// Which side opened a candidate connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Accepted,
    Outgoing,
}

/// Everything a spawned attempt needs to hand its connection over.
#[derive(Clone)]
struct Candidates {
    chooser: Arc<ConnectionChooser>,
    notifier: Notifier,
    role: watch::Receiver<Option<Role>>,
    stop: watch::Receiver<bool>,
    waiting_sent: Arc<AtomicBool>,
    data_poll_interval: Duration,
}

impl Candidates {
    /// Submit `connection` to the chooser once it is usable for our role.
    async fn offer(mut self, mut connection: KeyAgreementConnection, origin: Origin) {
        let Some(role) = self.role().await else {
            connection.dispose(false, false).await;
            return;
        };
        if !role.is_alice() {
            if let Err(e) = self.await_data(&mut connection, origin).await {
                debug!(
                    connection = connection.id(),
                    error = %e,
                    "Candidate closed before sending data"
                );
                connection.dispose(true, false).await;
                return;
            }
        }
        self.chooser.submit(connection).await;
    }

    /// Our role, once `connect` has fixed it. `None` if stopped first.
    async fn role(&mut self) -> Option<Role> {
        loop {
            let current = *self.role.borrow_and_update();
            if current.is_some() {
                return current;
            }
            tokio::select! {
                changed = self.role.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = stopped(&mut self.stop) => return None,
            }
        }
    }

    /// Only accepted candidates announce waiting: the peer dialled us and
    /// has yet to speak.
    async fn await_data(
        &mut self,
        connection: &mut KeyAgreementConnection,
        origin: Origin,
    ) -> io::Result<()> {
        loop {
            let readable = tokio::time::timeout(self.data_poll_interval, connection.wait_readable());
            let polled = tokio::select! {
                polled = readable => polled,
                _ = stopped(&mut self.stop) => {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "key agreement stopped"));
                }
            };
            match polled {
                Ok(result) => return result,
                Err(_) if origin == Origin::Accepted => {
                    if !self.waiting_sent.swap(true, Ordering::SeqCst) {
                        self.notifier.waiting().await;
                    }
                }
                Err(_) => {}
            }
        }
    }
}

#[derive(Default)]
struct ConnectorState {
    commitment: Option<Commitment>,
    listeners: Vec<Arc<dyn KeyAgreementListener>>,
}

/// Single-use: one `listen`, at most one `connect`.
pub struct KeyAgreementConnector {
    config: ConnectorConfig,
    plugins: Vec<Arc<dyn DuplexPlugin>>,
    notifier: Notifier,
    chooser: Arc<ConnectionChooser>,
    role: watch::Sender<Option<Role>>,
    stop: watch::Sender<bool>,
    waiting_sent: Arc<AtomicBool>,
    state: Mutex<ConnectorState>,
}

impl KeyAgreementConnector {
    pub fn new(
        config: ConnectorConfig,
        plugins: Vec<Arc<dyn DuplexPlugin>>,
        notifier: Notifier,
    ) -> Result<Self, KeyAgreementError> {
        config.validate()?;
        let (role, _) = watch::channel(None);
        let (stop, _) = watch::channel(false);
        Ok(Self {
            config,
            plugins,
            notifier,
            chooser: Arc::new(ConnectionChooser::new()),
            role,
            stop,
            waiting_sent: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(ConnectorState::default()),
        })
    }

    fn candidates(&self) -> Candidates {
        Candidates {
            chooser: self.chooser.clone(),
            notifier: self.notifier.clone(),
            role: self.role.subscribe(),
            stop: self.stop.subscribe(),
            waiting_sent: self.waiting_sent.clone(),
            data_poll_interval: self.config.data_poll_interval,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Start listening on every key-agreement transport and return the
    /// payload advertising them.
    pub async fn listen(&self, key_pair: &AgreementKeyPair) -> Result<Payload, KeyAgreementError> {
        if self.is_stopped() {
            return Err(KeyAgreementError::Stopped);
        }
        let commitment = derive_commitment(key_pair.public());
        {
            let mut state = self.state.lock();
            if state.commitment.is_some() {
                return Err(KeyAgreementError::AlreadyListening);
            }
            state.commitment = Some(commitment);
        }

        let mut descriptors = Vec::new();
        for plugin in &self.plugins {
            if !plugin.supports_key_agreement() || !is_advertisable(plugin.id()) {
                continue;
            }
            let listener = match plugin.create_key_agreement_listener(&commitment).await {
                Ok(Some(listener)) => Arc::<dyn KeyAgreementListener>::from(listener),
                Ok(None) => {
                    debug!(transport = %plugin.id(), "Transport not available for listening");
                    continue;
                }
                Err(e) => {
                    warn!(transport = %plugin.id(), error = %e, "Failed to create listener");
                    continue;
                }
            };
            descriptors.push(listener.descriptor().clone());
            self.state.lock().listeners.push(listener.clone());
            tokio::spawn(accept_one(listener, self.candidates()));
        }

        info!(transports = descriptors.len(), "Listening for key agreement");
        Ok(Payload::new(commitment, descriptors))
    }

    /// Race connections to the peer advertising `remote` and return the
    /// first usable one. `Ok(None)` if nothing connected before the
    /// deadline.
    ///
    /// Every other candidate is closed, including any that completes after
    /// this returns.
    pub async fn connect(
        &self,
        remote: &Payload,
        role: Role,
    ) -> Result<Option<KeyAgreementConnection>, KeyAgreementError> {
        if self.state.lock().commitment.is_none() {
            return Err(KeyAgreementError::NotListening);
        }
        if self.is_stopped() {
            return Err(KeyAgreementError::Stopped);
        }
        self.role.send_replace(Some(role));

        let deadline = Instant::now() + self.config.connection_timeout;
        let mut attempts = 0usize;
        for descriptor in remote.descriptors() {
            let plugin = self
                .plugins
                .iter()
                .find(|p| p.supports_key_agreement() && p.id() == &descriptor.transport);
            let Some(plugin) = plugin else {
                debug!(transport = %descriptor.transport, "No local plugin for descriptor");
                continue;
            };
            let retry = Retry {
                interval: self.config.retry_interval,
                deadline,
                stop: self.stop.subscribe(),
            };
            tokio::spawn(connect_with_retry(
                plugin.clone(),
                *remote.commitment(),
                descriptor.clone(),
                retry,
                self.candidates(),
            ));
            attempts += 1;
        }
        info!(alice = role.is_alice(), attempts, "Connecting to peer");

        let chosen = self
            .chooser
            .poll(deadline.saturating_duration_since(Instant::now()))
            .await;
        let cancelled = self.is_stopped();
        self.stop().await;

        match chosen {
            Some(connection) => {
                info!(
                    connection = connection.id(),
                    transport = %connection.transport(),
                    "Chose key agreement connection"
                );
                Ok(Some(connection))
            }
            None if cancelled => Err(KeyAgreementError::Stopped),
            None => {
                info!("No key agreement connection before deadline");
                Ok(None)
            }
        }
    }

    /// Stop listeners and attempts and close every unchosen connection.
    /// Idempotent.
    pub async fn stop(&self) {
        self.stop.send_replace(true);
        let listeners = std::mem::take(&mut self.state.lock().listeners);
        for listener in listeners {
            listener.close();
        }
        self.chooser.stop().await;
    }
}

async fn accept_one(listener: Arc<dyn KeyAgreementListener>, candidates: Candidates) {
    let mut stop = candidates.stop.clone();
    let transport = listener.descriptor().transport.clone();
    let accepted = tokio::select! {
        accepted = listener.accept() => accepted,
        _ = stopped(&mut stop) => return,
    };
    match accepted {
        Ok(connection) => {
            debug!(
                connection = connection.id(),
                transport = %transport,
                "Accepted key agreement connection"
            );
            candidates.offer(connection, Origin::Accepted).await;
        }
        Err(e) => debug!(transport = %transport, error = %e, "Listener stopped"),
    }
}

async fn connect_with_retry(
    plugin: Arc<dyn DuplexPlugin>,
    commitment: Commitment,
    descriptor: TransportDescriptor,
    mut retry: Retry,
    candidates: Candidates,
) {
    while let Some(remaining) = retry.remaining() {
        let attempt = plugin.create_key_agreement_connection(&commitment, &descriptor, remaining);
        let attempt = tokio::select! {
            attempt = attempt => attempt,
            _ = stopped(&mut retry.stop) => return,
        };
        match attempt {
            Ok(Some(connection)) => {
                debug!(
                    connection = connection.id(),
                    transport = %plugin.id(),
                    "Outgoing key agreement connection"
                );
                candidates.offer(connection, Origin::Outgoing).await;
                return;
            }
            Ok(None) => debug!(transport = %plugin.id(), "No answer, retrying"),
            Err(e) => debug!(transport = %plugin.id(), error = %e, "Connect failed, retrying"),
        }
        if !retry.pause().await {
            return;
        }
    }
}
