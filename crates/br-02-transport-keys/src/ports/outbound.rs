//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the key manager and recogniser need from the host.
//!
//! Production: a database-backed store supplied by the node.
//! Testing: `InMemorySecretStore` and `FixedTimeSource`.

use crate::domain::StoreError;
use async_trait::async_trait;
use shared_types::{ContactId, EndpointKey, TemporarySecret, TransportId};
use std::collections::HashMap;

/// Durable storage for temporary secrets and the counters that travel with
/// them.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Every stored secret, windows and counters included.
    async fn load_secrets(&self) -> Result<Vec<TemporarySecret>, StoreError>;

    /// Insert or replace secrets in one batch.
    async fn add_secrets(&self, secrets: &[TemporarySecret]) -> Result<(), StoreError>;

    async fn add_secret(&self, secret: &TemporarySecret) -> Result<(), StoreError> {
        self.add_secrets(std::slice::from_ref(secret)).await
    }

    /// Remove one secret. Removing an absent secret is not an error.
    async fn remove_secret(&self, key: &EndpointKey, period: u32) -> Result<(), StoreError>;

    async fn remove_secrets_for_contact(&self, contact: ContactId) -> Result<(), StoreError>;

    async fn remove_secrets_for_transport(&self, transport: &TransportId)
        -> Result<(), StoreError>;

    /// Declared maximum latency (ms) of every known transport.
    async fn transport_latencies(&self) -> Result<HashMap<TransportId, u64>, StoreError>;

    async fn set_transport_latency(
        &self,
        transport: &TransportId,
        max_latency_ms: u64,
    ) -> Result<(), StoreError>;

    /// Return the next outgoing connection number for a secret and advance
    /// the counter.
    async fn increment_connection_counter(
        &self,
        key: &EndpointKey,
        period: u32,
    ) -> Result<u64, StoreError>;

    /// Persist a secret's reordering window.
    async fn set_connection_window(
        &self,
        key: &EndpointKey,
        period: u32,
        centre: u64,
        bitmap: u32,
    ) -> Result<(), StoreError>;
}

/// Wall-clock source, abstracted so tests can move time.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}
