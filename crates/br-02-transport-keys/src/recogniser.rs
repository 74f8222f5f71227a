//! # Connection Recogniser
//!
//! Identifies which contact an incoming stream belongs to from the opaque
//! tag that precedes its first frame.
//!
//! For every incoming secret the recogniser precomputes the tag of each
//! unseen connection number in the secret's window and indexes it per
//! transport. Accepting a tag marks its number seen, which may slide the
//! window: retired numbers lose their tags and new numbers get fresh ones.
//!
//! ## Locking
//!
//! One lock guards the in-memory maps. Tag encoding and persistence happen
//! outside it; results are merged back under a second short critical
//! section. Window saves are ordered by a separate async lock.

use crate::domain::{ConnectionWindow, RecogniserError, StoreError};
use crate::ports::SecretStore;
use parking_lot::Mutex;
use shared_crypto::{derive_tag_key, encode_tag};
use shared_types::{
    check_u32, ConnectionContext, ContactId, EndpointKey, SecretKey, Tag, TemporarySecret,
    TransportId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct TagContext {
    contact: ContactId,
    period: u32,
    connection: u64,
}

struct WindowContext {
    secret: SecretKey,
    tag_key: SecretKey,
    alice: bool,
    window: ConnectionWindow,
    tags: HashMap<u64, Tag>,
}

#[derive(Default)]
struct TransportTags {
    tags: HashMap<Tag, TagContext>,
    windows: HashMap<(ContactId, u32), WindowContext>,
}

impl TransportTags {
    fn remove_window(&mut self, contact: ContactId, period: u32) -> bool {
        match self.windows.remove(&(contact, period)) {
            Some(ctx) => {
                for tag in ctx.tags.values() {
                    self.tags.remove(tag);
                }
                true
            }
            None => false,
        }
    }

    fn assert_no_orphans(&self) {
        debug_assert!(
            !self.windows.is_empty() || self.tags.is_empty(),
            "tags left behind after every window was removed"
        );
    }
}

pub struct ConnectionRecogniser {
    transports: Mutex<HashMap<TransportId, TransportTags>>,
    store: Arc<dyn SecretStore>,
    /// Held across every window save.
    persist: tokio::sync::Mutex<()>,
}

impl ConnectionRecogniser {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            transports: Mutex::new(HashMap::new()),
            store,
            persist: tokio::sync::Mutex::new(()),
        }
    }

    /// Start recognising connections made with `secret`. Adding a secret
    /// that is already present replaces its window.
    pub fn add_secret(&self, secret: &TemporarySecret) -> Result<(), RecogniserError> {
        let window = ConnectionWindow::from_parts(secret.window_centre, secret.window_bitmap)?;
        // Incoming connections are initiated by the peer, so use their role.
        let tag_key = derive_tag_key(&secret.secret, !secret.alice())?;
        let tags = encode_tags(&tag_key, window.unseen())?;

        let contact = secret.contact();
        let period = secret.period;
        let count = tags.len();
        {
            let mut transports = self.transports.lock();
            let entry = transports.entry(secret.transport().clone()).or_default();
            entry.remove_window(contact, period);
            for (connection, tag) in &tags {
                entry.tags.insert(
                    *tag,
                    TagContext {
                        contact,
                        period,
                        connection: *connection,
                    },
                );
            }
            entry.windows.insert(
                (contact, period),
                WindowContext {
                    secret: secret.secret.clone(),
                    tag_key,
                    alice: secret.alice(),
                    window,
                    tags: tags.into_iter().collect(),
                },
            );
        }
        debug!(
            contact = %contact,
            transport = %secret.transport(),
            period,
            tags = count,
            "Added secret to recogniser"
        );
        Ok(())
    }

    /// Look up an incoming tag.
    ///
    /// Returns `Ok(None)` for tags that match nothing, which is the common
    /// case. A recognised tag is consumed: the same tag is never accepted
    /// twice. The returned context carries its own copy of the secret.
    pub async fn accept_connection(
        &self,
        transport: &TransportId,
        tag: &Tag,
    ) -> Result<Option<ConnectionContext>, RecogniserError> {
        let (found, secret, tag_key, alice, added) = {
            let mut transports = self.transports.lock();
            let Some(entry) = transports.get_mut(transport) else {
                return Ok(None);
            };
            let Some(found) = entry.tags.remove(tag) else {
                return Ok(None);
            };
            let Some(ctx) = entry.windows.get_mut(&(found.contact, found.period)) else {
                warn!(
                    contact = %found.contact,
                    transport = %transport,
                    period = found.period,
                    "Tag without a window"
                );
                return Ok(None);
            };
            ctx.tags.remove(&found.connection);
            let update = ctx.window.set_seen(found.connection)?;
            for retired in &update.retired {
                if let Some(old) = ctx.tags.remove(retired) {
                    entry.tags.remove(&old);
                }
            }
            (
                found,
                ctx.secret.clone(),
                ctx.tag_key.clone(),
                ctx.alice,
                update.added,
            )
        };

        let fresh = encode_tags(&tag_key, added)?;

        {
            let mut transports = self.transports.lock();
            if let Some(entry) = transports.get_mut(transport) {
                if let Some(ctx) = entry.windows.get_mut(&(found.contact, found.period)) {
                    for (connection, tag) in fresh {
                        // Another acceptance may have moved the window meanwhile.
                        if ctx.window.is_seen(connection)
                            || !ctx.window.contains(connection)
                            || ctx.tags.contains_key(&connection)
                        {
                            continue;
                        }
                        ctx.tags.insert(connection, tag);
                        entry.tags.insert(
                            tag,
                            TagContext {
                                contact: found.contact,
                                period: found.period,
                                connection,
                            },
                        );
                    }
                }
            }
        }

        // Saves are serialised and each writes the window as it stands when
        // the save starts, so the stored window never moves backwards.
        let _persist = self.persist.lock().await;
        let window = self.current_window(transport, found.contact, found.period);

        let key = EndpointKey {
            contact: found.contact,
            transport: transport.clone(),
        };
        if let Some(window) = window {
            match self
                .store
                .set_connection_window(&key, found.period, window.centre(), window.bitmap())
                .await
            {
                Ok(()) => {}
                // The secret was retired while we were recognising it.
                Err(StoreError::SecretNotFound { .. }) => {
                    debug!(contact = %found.contact, period = found.period, "Window owner gone");
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            contact = %found.contact,
            transport = %transport,
            period = found.period,
            connection = found.connection,
            "Recognised connection"
        );
        Ok(Some(ConnectionContext {
            contact: found.contact,
            transport: transport.clone(),
            secret,
            connection: check_u32("connection number", found.connection)?,
            alice,
        }))
    }

    pub fn remove_secret(&self, contact: ContactId, transport: &TransportId, period: u32) {
        let mut transports = self.transports.lock();
        if let Some(entry) = transports.get_mut(transport) {
            if entry.remove_window(contact, period) {
                debug!(contact = %contact, transport = %transport, period, "Removed secret");
            }
            if entry.windows.is_empty() {
                entry.assert_no_orphans();
                transports.remove(transport);
            }
        }
    }

    pub fn remove_secrets_for_contact(&self, contact: ContactId) {
        let mut transports = self.transports.lock();
        for entry in transports.values_mut() {
            let periods: Vec<u32> = entry
                .windows
                .keys()
                .filter(|(c, _)| *c == contact)
                .map(|(_, period)| *period)
                .collect();
            for period in periods {
                entry.remove_window(contact, period);
            }
            entry.assert_no_orphans();
        }
        transports.retain(|_, entry| !entry.windows.is_empty());
    }

    pub fn remove_secrets_for_transport(&self, transport: &TransportId) {
        self.transports.lock().remove(transport);
    }

    pub fn remove_all_secrets(&self) {
        let mut transports = self.transports.lock();
        for entry in transports.values_mut() {
            let keys: Vec<(ContactId, u32)> = entry.windows.keys().copied().collect();
            for (contact, period) in keys {
                entry.remove_window(contact, period);
            }
            entry.assert_no_orphans();
        }
        transports.clear();
    }

    fn current_window(
        &self,
        transport: &TransportId,
        contact: ContactId,
        period: u32,
    ) -> Option<ConnectionWindow> {
        self.transports
            .lock()
            .get(transport)
            .and_then(|entry| entry.windows.get(&(contact, period)))
            .map(|ctx| ctx.window)
    }

    /// Number of tags currently indexed, over all transports.
    pub fn tag_count(&self) -> usize {
        self.transports.lock().values().map(|t| t.tags.len()).sum()
    }

    /// Is a secret for (`contact`, `transport`, `period`) registered?
    pub fn contains_secret(&self, contact: ContactId, transport: &TransportId, period: u32) -> bool {
        self.transports
            .lock()
            .get(transport)
            .is_some_and(|t| t.windows.contains_key(&(contact, period)))
    }
}

fn encode_tags(
    tag_key: &SecretKey,
    connections: Vec<u64>,
) -> Result<Vec<(u64, Tag)>, RecogniserError> {
    connections
        .into_iter()
        .map(|connection| Ok((connection, encode_tag(tag_key, connection)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySecretStore;
    use crate::domain::WINDOW_SIZE;
    use shared_types::Endpoint;

    fn lan() -> TransportId {
        TransportId::new("lan")
    }

    fn secret(contact: u32, period: u32, alice: bool) -> TemporarySecret {
        let endpoint = Endpoint::new(ContactId(contact), lan(), 0, alice);
        TemporarySecret::new(endpoint, period, SecretKey::from_bytes([contact as u8 + 1; 32]))
    }

    /// The tag the peer of `secret` would send on `connection`.
    fn peer_tag(secret: &TemporarySecret, connection: u64) -> Tag {
        let key = derive_tag_key(&secret.secret, !secret.alice()).unwrap();
        encode_tag(&key, connection).unwrap()
    }

    async fn setup(secrets: &[TemporarySecret]) -> (Arc<InMemorySecretStore>, ConnectionRecogniser) {
        let store = Arc::new(InMemorySecretStore::new());
        store.add_secrets(secrets).await.unwrap();
        let recogniser = ConnectionRecogniser::new(store.clone());
        for s in secrets {
            recogniser.add_secret(s).unwrap();
        }
        (store, recogniser)
    }

    #[tokio::test]
    async fn test_accepts_tag_exactly_once() {
        let s = secret(1, 5, true);
        let (_, recogniser) = setup(&[s.clone()]).await;
        let tag = peer_tag(&s, 3);

        let ctx = recogniser.accept_connection(&lan(), &tag).await.unwrap().unwrap();
        assert_eq!(ctx.contact, ContactId(1));
        assert_eq!(ctx.connection, 3);
        assert!(ctx.alice);
        assert_eq!(ctx.secret, s.secret);

        assert!(recogniser.accept_connection(&lan(), &tag).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_tag_and_transport() {
        let s = secret(1, 0, false);
        let (_, recogniser) = setup(&[s.clone()]).await;
        let tag = peer_tag(&s, 0);
        assert!(recogniser
            .accept_connection(&TransportId::new("bluetooth"), &tag)
            .await
            .unwrap()
            .is_none());
        assert!(recogniser
            .accept_connection(&lan(), &[0u8; 16])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_own_outgoing_tags_are_not_recognised() {
        let s = secret(1, 0, true);
        let (_, recogniser) = setup(&[s.clone()]).await;
        let own = encode_tag(&derive_tag_key(&s.secret, s.alice()).unwrap(), 0).unwrap();
        assert!(recogniser.accept_connection(&lan(), &own).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_window_slides_and_is_persisted() {
        let s = secret(2, 0, true);
        let (store, recogniser) = setup(&[s.clone()]).await;
        assert_eq!(recogniser.tag_count(), WINDOW_SIZE as usize);

        recogniser
            .accept_connection(&lan(), &peer_tag(&s, 20))
            .await
            .unwrap()
            .unwrap();

        // Base moved to 5: 0..5 retired, 32..37 added, 20 consumed.
        assert_eq!(recogniser.tag_count(), WINDOW_SIZE as usize - 1);
        assert!(recogniser
            .accept_connection(&lan(), &peer_tag(&s, 1))
            .await
            .unwrap()
            .is_none());
        assert!(recogniser
            .accept_connection(&lan(), &peer_tag(&s, 36))
            .await
            .unwrap()
            .is_some());

        let stored = store.get_secret(&s.key(), 0).unwrap();
        assert_eq!(stored.window_centre, 37);
    }

    #[tokio::test]
    async fn test_restored_window_skips_seen_numbers() {
        let mut s = secret(3, 0, false);
        let mut window = ConnectionWindow::new();
        window.set_seen(4).unwrap();
        s.window_centre = window.centre();
        s.window_bitmap = window.bitmap();
        let (_, recogniser) = setup(&[s.clone()]).await;

        assert!(recogniser
            .accept_connection(&lan(), &peer_tag(&s, 4))
            .await
            .unwrap()
            .is_none());
        assert!(recogniser
            .accept_connection(&lan(), &peer_tag(&s, 5))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_remove_secret_drops_its_tags() {
        let a = secret(1, 0, true);
        let b = secret(2, 0, true);
        let (_, recogniser) = setup(&[a.clone(), b.clone()]).await;

        recogniser.remove_secret(ContactId(1), &lan(), 0);
        recogniser.remove_secret(ContactId(1), &lan(), 0);
        assert_eq!(recogniser.tag_count(), WINDOW_SIZE as usize);
        assert!(!recogniser.contains_secret(ContactId(1), &lan(), 0));
        assert!(recogniser
            .accept_connection(&lan(), &peer_tag(&a, 0))
            .await
            .unwrap()
            .is_none());
        assert!(recogniser
            .accept_connection(&lan(), &peer_tag(&b, 0))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_bulk_removal() {
        let (_, recogniser) =
            setup(&[secret(1, 0, true), secret(1, 1, true), secret(2, 0, false)]).await;

        recogniser.remove_secrets_for_contact(ContactId(1));
        assert_eq!(recogniser.tag_count(), WINDOW_SIZE as usize);

        recogniser.remove_secrets_for_transport(&lan());
        assert_eq!(recogniser.tag_count(), 0);

        recogniser.add_secret(&secret(4, 0, true)).unwrap();
        recogniser.remove_all_secrets();
        recogniser.remove_all_secrets();
        assert_eq!(recogniser.tag_count(), 0);
    }

    /// Delays the first window save so a later acceptance can overtake it.
    struct SlowFirstSave {
        inner: Arc<InMemorySecretStore>,
        delayed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl SecretStore for SlowFirstSave {
        async fn load_secrets(&self) -> Result<Vec<TemporarySecret>, StoreError> {
            self.inner.load_secrets().await
        }

        async fn add_secrets(&self, secrets: &[TemporarySecret]) -> Result<(), StoreError> {
            self.inner.add_secrets(secrets).await
        }

        async fn remove_secret(&self, key: &EndpointKey, period: u32) -> Result<(), StoreError> {
            self.inner.remove_secret(key, period).await
        }

        async fn remove_secrets_for_contact(&self, contact: ContactId) -> Result<(), StoreError> {
            self.inner.remove_secrets_for_contact(contact).await
        }

        async fn remove_secrets_for_transport(
            &self,
            transport: &TransportId,
        ) -> Result<(), StoreError> {
            self.inner.remove_secrets_for_transport(transport).await
        }

        async fn transport_latencies(&self) -> Result<HashMap<TransportId, u64>, StoreError> {
            self.inner.transport_latencies().await
        }

        async fn set_transport_latency(
            &self,
            transport: &TransportId,
            max_latency_ms: u64,
        ) -> Result<(), StoreError> {
            self.inner.set_transport_latency(transport, max_latency_ms).await
        }

        async fn increment_connection_counter(
            &self,
            key: &EndpointKey,
            period: u32,
        ) -> Result<u64, StoreError> {
            self.inner.increment_connection_counter(key, period).await
        }

        async fn set_connection_window(
            &self,
            key: &EndpointKey,
            period: u32,
            centre: u64,
            bitmap: u32,
        ) -> Result<(), StoreError> {
            if !self.delayed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            self.inner.set_connection_window(key, period, centre, bitmap).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_accepts_never_store_an_older_window() {
        let s = secret(1, 0, true);
        let inner = Arc::new(InMemorySecretStore::new());
        inner.add_secret(&s).await.unwrap();
        let store = Arc::new(SlowFirstSave {
            inner: inner.clone(),
            delayed: Default::default(),
        });
        let recogniser = ConnectionRecogniser::new(store.clone());
        recogniser.add_secret(&s).unwrap();

        let transport = lan();
        let (tag_3, tag_10) = (peer_tag(&s, 3), peer_tag(&s, 10));
        let (first, second) = tokio::join!(
            recogniser.accept_connection(&transport, &tag_3),
            recogniser.accept_connection(&transport, &tag_10)
        );
        assert!(first.unwrap().is_some());
        assert!(second.unwrap().is_some());

        let stored = inner.get_secret(&s.key(), 0).unwrap();
        let mut expected = ConnectionWindow::new();
        expected.set_seen(3).unwrap();
        expected.set_seen(10).unwrap();
        assert_eq!(stored.window_centre, expected.centre());
        assert_eq!(stored.window_bitmap, expected.bitmap());

        // A recogniser rebuilt from the store rejects both numbers.
        let restarted = ConnectionRecogniser::new(store);
        for loaded in inner.load_secrets().await.unwrap() {
            restarted.add_secret(&loaded).unwrap();
        }
        for connection in [3, 10] {
            assert!(restarted
                .accept_connection(&lan(), &peer_tag(&s, connection))
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let s = secret(1, 0, true);
        let (store, recogniser) = setup(&[s.clone()]).await;
        store.set_fail_writes(true);
        assert!(matches!(
            recogniser.accept_connection(&lan(), &peer_tag(&s, 0)).await,
            Err(RecogniserError::Store(StoreError::Backend(_)))
        ));
    }
}
