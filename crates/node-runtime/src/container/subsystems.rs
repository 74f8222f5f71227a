//! # Subsystem Container
//!
//! Holds every component instance, built exactly once.
//!
//! ## Initialization Order
//!
//! ```text
//! Phase 1: event bus, time source, secret store
//! Phase 2: connection recogniser (store)
//! Phase 3: key manager (store, recogniser, time source)
//! Phase 4: transport plugins, stream factory
//! ```
//!
//! Components never reach each other through globals: everything they need
//! is handed over here.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument};

use br_01_key_agreement::DuplexPlugin;
use br_02_transport_keys::{
    ConnectionRecogniser, InMemorySecretStore, KeyManager, SecretStore, SystemTimeSource,
    TimeSource,
};
use br_03_stream_crypto::StreamFactory;
use shared_bus::InMemoryEventBus;
use shared_types::TransportId;

use crate::container::config::NodeConfig;
use crate::errors::NodeError;

/// Central container holding all component instances.
pub struct SubsystemContainer {
    // =========================================================================
    // SHARED INFRASTRUCTURE
    // =========================================================================
    /// Event bus carrying key-agreement and lifecycle events.
    pub event_bus: Arc<InMemoryEventBus>,

    pub time_source: Arc<dyn TimeSource>,

    pub store: Arc<dyn SecretStore>,

    // =========================================================================
    // TRANSPORT KEYS
    // =========================================================================
    pub recogniser: Arc<ConnectionRecogniser>,

    pub key_manager: Arc<KeyManager>,

    // =========================================================================
    // TRANSPORTS AND STREAMS
    // =========================================================================
    /// Registered plugins, ordered by transport id.
    pub plugins: Vec<Arc<dyn DuplexPlugin>>,

    pub stream_factory: StreamFactory,

    /// Node configuration (immutable after initialization).
    pub config: NodeConfig,
}

impl SubsystemContainer {
    /// Container with the system clock and an in-memory secret store.
    pub fn new(config: NodeConfig, plugins: Vec<Arc<dyn DuplexPlugin>>) -> Result<Self, NodeError> {
        Self::with_components(
            config,
            plugins,
            Arc::new(InMemorySecretStore::new()),
            Arc::new(SystemTimeSource),
        )
    }

    /// Container around a caller-supplied store and clock.
    #[instrument(name = "subsystem_init", skip_all)]
    pub fn with_components(
        config: NodeConfig,
        mut plugins: Vec<Arc<dyn DuplexPlugin>>,
        store: Arc<dyn SecretStore>,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        info!("Phase 1: Creating shared infrastructure");
        let event_bus = Arc::new(InMemoryEventBus::new());

        info!("Phase 2: Connection recogniser");
        let recogniser = Arc::new(ConnectionRecogniser::new(store.clone()));

        info!("Phase 3: Key manager");
        let key_manager = Arc::new(KeyManager::new(
            config.key_manager,
            store.clone(),
            recogniser.clone(),
            time_source.clone(),
        )?);

        info!("Phase 4: Transports and stream factory");
        plugins.sort_by(|a, b| a.id().cmp(b.id()));
        let mut seen = HashSet::new();
        for plugin in &plugins {
            if !seen.insert(plugin.id().clone()) {
                return Err(NodeError::DuplicateTransport(plugin.id().clone()));
            }
            info!(
                transport = %plugin.id(),
                max_latency_ms = plugin.max_latency_ms(),
                key_agreement = plugin.supports_key_agreement(),
                "Transport registered"
            );
        }
        let stream_factory = StreamFactory::new(config.frame)?;

        Ok(Self {
            event_bus,
            time_source,
            store,
            recogniser,
            key_manager,
            plugins,
            stream_factory,
            config,
        })
    }

    /// Latency the key manager uses for `plugin`: the configured override,
    /// else what the plugin declares.
    pub fn transport_latency(&self, plugin: &dyn DuplexPlugin) -> u64 {
        self.config
            .transport_latencies
            .get(plugin.id())
            .copied()
            .unwrap_or_else(|| plugin.max_latency_ms())
    }

    /// Position of `transport` among the registered transports, used to
    /// derive its initial secret. Both peers must register the same set.
    pub fn transport_index(&self, transport: &TransportId) -> Option<u32> {
        self.plugins
            .iter()
            .position(|p| p.id() == transport)
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn transports(&self) -> impl Iterator<Item = &TransportId> {
        self.plugins.iter().map(|p| p.id())
    }
}
