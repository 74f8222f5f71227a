//! # Node Runtime
//!
//! Owns the container and the lifecycle of everything spawned around it.
//!
//! ## Startup Sequence
//!
//! 1. Record each transport's maximum latency with the key manager
//! 2. Start the key manager (load secrets, start the rotation timer)
//! 3. Spawn event routing from the bus to the key manager
//!
//! ## Shutdown Sequence
//!
//! 1. Signal every spawned loop through the shutdown channel
//! 2. Wait for the loops to finish
//! 3. Stop the key manager, erasing in-memory secrets

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use br_01_key_agreement::{DuplexPlugin, KeyAgreementResult, KeyAgreementTask};
use br_02_transport_keys::{ConnectionRecogniser, KeyManager};
use br_03_stream_crypto::StreamFactory;
use shared_bus::{BrambleEvent, EventPublisher, InMemoryEventBus};
use shared_crypto::derive_initial_secret;
use shared_types::{
    ConnectionContext, ContactId, Endpoint, EndpointKey, SecretKey, Tag, TransportId,
};

use crate::container::{NodeConfig, SubsystemContainer};
use crate::errors::NodeError;
use crate::wiring::KeyEventRouter;

pub struct NodeRuntime {
    container: Arc<SubsystemContainer>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig, plugins: Vec<Arc<dyn DuplexPlugin>>) -> Result<Self, NodeError> {
        Ok(Self::from_container(SubsystemContainer::new(config, plugins)?))
    }

    pub fn from_container(container: SubsystemContainer) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            container: Arc::new(container),
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(&self) -> Result<(), NodeError> {
        info!("===========================================");
        info!("  Bramble Node Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let container = &self.container;
        for plugin in &container.plugins {
            let latency = container.transport_latency(plugin.as_ref());
            container
                .key_manager
                .set_transport_latency(plugin.id(), latency)
                .await?;
        }
        container.key_manager.start().await?;

        let router = KeyEventRouter::new(&container.event_bus, container.key_manager.clone());
        let handle = tokio::spawn(router.run(self.shutdown_rx.clone()));
        self.handles.lock().push(handle);

        info!(
            transports = container.plugins.len(),
            frame_length = container.config.frame.frame_length,
            "Node runtime started"
        );
        Ok(())
    }

    /// Stop every loop and the key manager. Idempotent.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.shutdown_tx.send_replace(true);

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Spawned loop panicked");
            }
        }
        self.container.key_manager.stop().await;
        info!("Shutdown complete");
    }

    /// A fresh key-agreement task over every registered transport.
    pub fn new_key_agreement_task(&self) -> Result<KeyAgreementTask, NodeError> {
        let container = &self.container;
        if !container.plugins.iter().any(|p| p.supports_key_agreement()) {
            return Err(NodeError::NoKeyAgreementTransport);
        }
        let publisher: Arc<dyn EventPublisher> = container.event_bus.clone();
        Ok(KeyAgreementTask::new(
            container.config.connector,
            container.plugins.clone(),
            publisher,
        )?)
    }

    /// Seed every registered transport for `contact` from an agreed master
    /// secret. Both peers must pass the same `epoch`.
    ///
    /// All or nothing: if any transport fails, the ones already seeded are
    /// removed again before the error is returned.
    ///
    /// Returns the transports that were added.
    pub async fn add_contact_from_agreement(
        &self,
        contact: ContactId,
        result: &KeyAgreementResult,
        epoch: u64,
    ) -> Result<Vec<TransportId>, NodeError> {
        self.add_contact(contact, &result.master_secret, result.alice, epoch)
            .await
    }

    async fn add_contact(
        &self,
        contact: ContactId,
        master_secret: &SecretKey,
        alice: bool,
        epoch: u64,
    ) -> Result<Vec<TransportId>, NodeError> {
        let mut added = Vec::new();
        for transport in self.container.transports() {
            let Some(index) = self.container.transport_index(transport) else {
                continue;
            };
            let endpoint = Endpoint::new(contact, transport.clone(), epoch, alice);
            let seeded = match derive_initial_secret(master_secret, index) {
                Ok(initial) => self
                    .container
                    .key_manager
                    .endpoint_added(endpoint, initial)
                    .await
                    .map_err(NodeError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = seeded {
                warn!(contact = %contact, transport = %transport, error = %e, "Contact not added");
                self.roll_back_contact(contact, &added).await;
                return Err(e);
            }
            added.push(transport.clone());
        }
        info!(contact = %contact, transports = added.len(), "Contact added from key agreement");
        Ok(added)
    }

    async fn roll_back_contact(&self, contact: ContactId, added: &[TransportId]) {
        for transport in added {
            let key = EndpointKey {
                contact,
                transport: transport.clone(),
            };
            if let Err(e) = self.container.key_manager.endpoint_removed(&key).await {
                error!(contact = %contact, transport = %transport, error = %e, "Rollback failed");
            }
        }
    }

    /// Context for a new outgoing connection, or `None` if no outgoing
    /// secret exists yet.
    pub async fn connection_context(
        &self,
        contact: ContactId,
        transport: &TransportId,
    ) -> Result<Option<ConnectionContext>, NodeError> {
        Ok(self
            .container
            .key_manager
            .get_connection_context(contact, transport)
            .await?)
    }

    /// Look up the tag that opened an incoming connection.
    pub async fn recognise(
        &self,
        transport: &TransportId,
        tag: &Tag,
    ) -> Option<ConnectionContext> {
        match self.container.recogniser.accept_connection(transport, tag).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(transport = %transport, error = %e, "Failed to recognise tag");
                None
            }
        }
    }

    /// Delete a contact's secrets everywhere. Applied by the event router.
    pub async fn remove_contact(&self, contact: ContactId) {
        self.container
            .event_bus
            .publish(BrambleEvent::ContactRemoved { contact })
            .await;
    }

    /// Delete a transport's secrets everywhere. Applied by the event router.
    pub async fn remove_transport(&self, transport: TransportId) {
        self.container
            .event_bus
            .publish(BrambleEvent::TransportRemoved { transport })
            .await;
    }

    /// Announce a transport's new latency bound. Applied by the event router.
    pub async fn set_transport_latency(&self, transport: TransportId, max_latency_ms: u64) {
        self.container
            .event_bus
            .publish(BrambleEvent::TransportLatencyChanged {
                transport,
                max_latency_ms,
            })
            .await;
    }

    pub fn container(&self) -> Arc<SubsystemContainer> {
        Arc::clone(&self.container)
    }

    pub fn event_bus(&self) -> &Arc<InMemoryEventBus> {
        &self.container.event_bus
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.container.key_manager
    }

    pub fn recogniser(&self) -> &Arc<ConnectionRecogniser> {
        &self.container.recogniser
    }

    pub fn stream_factory(&self) -> &StreamFactory {
        &self.container.stream_factory
    }
}
