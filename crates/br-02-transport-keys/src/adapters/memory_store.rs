//! In-memory [`SecretStore`], for tests and for nodes that keep no state
//! across restarts.

use crate::domain::StoreError;
use crate::ports::SecretStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{ContactId, EndpointKey, TemporarySecret, TransportId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Inner {
    secrets: BTreeMap<(EndpointKey, u32), TemporarySecret>,
    latencies: HashMap<TransportId, u64>,
}

#[derive(Default)]
pub struct InMemorySecretStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with latencies already declared.
    pub fn with_latencies(latencies: impl IntoIterator<Item = (TransportId, u64)>) -> Self {
        let store = Self::new();
        store.inner.write().latencies.extend(latencies);
        store
    }

    /// Make every subsequent write fail with [`StoreError::Backend`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn secret_count(&self) -> usize {
        self.inner.read().secrets.len()
    }

    pub fn get_secret(&self, key: &EndpointKey, period: u32) -> Option<TemporarySecret> {
        self.inner.read().secrets.get(&(key.clone(), period)).cloned()
    }

    pub fn periods(&self, key: &EndpointKey) -> Vec<u32> {
        self.inner
            .read()
            .secrets
            .keys()
            .filter(|(k, _)| k == key)
            .map(|(_, period)| *period)
            .collect()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".into()));
        }
        Ok(())
    }

    fn not_found(key: &EndpointKey, period: u32) -> StoreError {
        StoreError::SecretNotFound {
            contact: key.contact,
            transport: key.transport.clone(),
            period,
        }
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn load_secrets(&self) -> Result<Vec<TemporarySecret>, StoreError> {
        Ok(self.inner.read().secrets.values().cloned().collect())
    }

    async fn add_secrets(&self, secrets: &[TemporarySecret]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write();
        for secret in secrets {
            inner
                .secrets
                .insert((secret.key(), secret.period), secret.clone());
        }
        Ok(())
    }

    async fn remove_secret(&self, key: &EndpointKey, period: u32) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.write().secrets.remove(&(key.clone(), period));
        Ok(())
    }

    async fn remove_secrets_for_contact(&self, contact: ContactId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner
            .write()
            .secrets
            .retain(|(key, _), _| key.contact != contact);
        Ok(())
    }

    async fn remove_secrets_for_transport(
        &self,
        transport: &TransportId,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write();
        inner.secrets.retain(|(key, _), _| &key.transport != transport);
        inner.latencies.remove(transport);
        Ok(())
    }

    async fn transport_latencies(&self) -> Result<HashMap<TransportId, u64>, StoreError> {
        Ok(self.inner.read().latencies.clone())
    }

    async fn set_transport_latency(
        &self,
        transport: &TransportId,
        max_latency_ms: u64,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner
            .write()
            .latencies
            .insert(transport.clone(), max_latency_ms);
        Ok(())
    }

    async fn increment_connection_counter(
        &self,
        key: &EndpointKey,
        period: u32,
    ) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write();
        let secret = inner
            .secrets
            .get_mut(&(key.clone(), period))
            .ok_or_else(|| Self::not_found(key, period))?;
        let connection = secret.outgoing_connections;
        secret.outgoing_connections += 1;
        Ok(connection)
    }

    async fn set_connection_window(
        &self,
        key: &EndpointKey,
        period: u32,
        centre: u64,
        bitmap: u32,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write();
        let secret = inner
            .secrets
            .get_mut(&(key.clone(), period))
            .ok_or_else(|| Self::not_found(key, period))?;
        secret.window_centre = centre;
        secret.window_bitmap = bitmap;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Endpoint, SecretKey};

    fn secret(contact: u32, transport: &str, period: u32) -> TemporarySecret {
        let endpoint = Endpoint::new(ContactId(contact), TransportId::new(transport), 0, true);
        TemporarySecret::new(endpoint, period, SecretKey::from_bytes([7; 32]))
    }

    #[tokio::test]
    async fn test_counter_starts_at_zero_and_advances() {
        let store = InMemorySecretStore::new();
        let s = secret(1, "lan", 3);
        store.add_secret(&s).await.unwrap();
        let key = s.key();
        assert_eq!(store.increment_connection_counter(&key, 3).await.unwrap(), 0);
        assert_eq!(store.increment_connection_counter(&key, 3).await.unwrap(), 1);
        assert!(matches!(
            store.increment_connection_counter(&key, 4).await,
            Err(StoreError::SecretNotFound { period: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_by_contact_and_transport() {
        let store = InMemorySecretStore::with_latencies([(TransportId::new("lan"), 10)]);
        store
            .add_secrets(&[
                secret(1, "lan", 0),
                secret(1, "bluetooth", 0),
                secret(2, "lan", 0),
            ])
            .await
            .unwrap();

        store.remove_secrets_for_contact(ContactId(1)).await.unwrap();
        assert_eq!(store.secret_count(), 1);

        store
            .remove_secrets_for_transport(&TransportId::new("lan"))
            .await
            .unwrap();
        assert_eq!(store.secret_count(), 0);
        assert!(store.transport_latencies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_window_is_persisted() {
        let store = InMemorySecretStore::new();
        let s = secret(1, "lan", 0);
        store.add_secret(&s).await.unwrap();
        store
            .set_connection_window(&s.key(), 0, 19, 0b101)
            .await
            .unwrap();
        let loaded = store.get_secret(&s.key(), 0).unwrap();
        assert_eq!((loaded.window_centre, loaded.window_bitmap), (19, 0b101));
    }

    #[tokio::test]
    async fn test_failed_writes() {
        let store = InMemorySecretStore::new();
        store.set_fail_writes(true);
        assert!(store.add_secret(&secret(1, "lan", 0)).await.is_err());
        assert_eq!(store.secret_count(), 0);
    }
}
