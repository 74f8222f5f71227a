//! # Key Manager
//!
//! Keeps every (contact, transport) endpoint supplied with the secrets of
//! the previous and current rotation periods, hands out outgoing connection
//! contexts and keeps the recogniser in step.
//!
//! ## Locking
//!
//! - `state` (parking_lot) guards the buckets and latencies. It is only held
//!   for in-memory reads and swaps, never across an `.await`.
//! - `writer` (tokio) serialises operations that rebuild state: start,
//!   rotation, endpoint addition, removals and stop. KDF work and
//!   persistence happen while holding it, outside `state`.

mod rotation;


use crate::config::KeyManagerConfig;
use crate::domain::{KeyManagerError, RotationSchedule, StoreError};
use crate::ports::{SecretStore, TimeSource};
use crate::recogniser::ConnectionRecogniser;
use parking_lot::Mutex;
use rotation::{plan_rotation, Buckets, RotationPlan};
use shared_bus::BrambleEvent;
use shared_types::{
    check_u32, ConnectionContext, ContactId, Endpoint, EndpointKey, SecretKey, TemporarySecret,
    TransportId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Default)]
struct KeyState {
    buckets: Buckets,
    latencies: HashMap<TransportId, u64>,
    started: bool,
}

pub struct KeyManager {
    config: KeyManagerConfig,
    store: Arc<dyn SecretStore>,
    recogniser: Arc<ConnectionRecogniser>,
    time_source: Arc<dyn TimeSource>,
    state: Mutex<KeyState>,
    writer: tokio::sync::Mutex<()>,
    shutdown: watch::Sender<bool>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl KeyManager {
    pub fn new(
        config: KeyManagerConfig,
        store: Arc<dyn SecretStore>,
        recogniser: Arc<ConnectionRecogniser>,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, KeyManagerError> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            store,
            recogniser,
            time_source,
            state: Mutex::new(KeyState::default()),
            writer: tokio::sync::Mutex::new(()),
            shutdown,
            timer: Mutex::new(None),
        })
    }

    pub fn recogniser(&self) -> &Arc<ConnectionRecogniser> {
        &self.recogniser
    }

    /// Load persisted secrets, replace dead ones, feed the incoming secrets
    /// to the recogniser and start the rotation timer.
    pub async fn start(self: &Arc<Self>) -> Result<(), KeyManagerError> {
        let _writer = self.writer.lock().await;
        if self.state.lock().started {
            return Err(KeyManagerError::AlreadyStarted);
        }

        let latencies = self.store.transport_latencies().await?;
        let secrets = self.store.load_secrets().await?;
        let loaded = secrets.len();
        let now = self.time_source.now();
        let plan = plan_rotation(
            now,
            secrets,
            &latencies,
            self.config.max_clock_difference_ms,
        )?;

        if !plan.created.is_empty() {
            self.store.add_secrets(&plan.created).await?;
        }
        self.forget(&plan.dead).await;
        for secret in plan.buckets.incoming() {
            self.recogniser.add_secret(secret)?;
        }

        {
            let mut state = self.state.lock();
            state.buckets = plan.buckets;
            state.latencies = latencies;
            state.started = true;
        }
        self.spawn_rotation_timer();

        info!(
            loaded,
            created = plan.created.len(),
            dead = plan.dead.len(),
            "Key manager started"
        );
        Ok(())
    }

    /// Rebuild all buckets from the secrets currently held. Runs on every
    /// timer tick; safe to call after missing any number of ticks.
    pub async fn rotate_keys(&self) -> Result<(), KeyManagerError> {
        let _writer = self.writer.lock().await;
        let (secrets, latencies) = {
            let state = self.state.lock();
            if !state.started {
                return Ok(());
            }
            let secrets: Vec<TemporarySecret> = state.buckets.incoming().cloned().collect();
            (secrets, state.latencies.clone())
        };

        let now = self.time_source.now();
        let plan = plan_rotation(
            now,
            secrets,
            &latencies,
            self.config.max_clock_difference_ms,
        )?;
        self.apply_rotation(plan).await;
        Ok(())
    }

    /// Bring the recogniser and the store in line with `plan`, then swap in
    /// its buckets. Failures are logged and never stop the swap.
    async fn apply_rotation(&self, plan: RotationPlan) {
        if plan.dead.is_empty() && plan.created.is_empty() {
            self.state.lock().buckets = plan.buckets;
            return;
        }

        for secret in &plan.dead {
            self.recogniser
                .remove_secret(secret.contact(), secret.transport(), secret.period);
        }
        if !plan.created.is_empty() {
            if let Err(e) = self.store.add_secrets(&plan.created).await {
                warn!(error = %e, created = plan.created.len(), "Failed to store rotated secrets");
            }
        }
        for secret in &plan.created {
            if let Err(e) = self.recogniser.add_secret(secret) {
                warn!(
                    contact = %secret.contact(),
                    transport = %secret.transport(),
                    period = secret.period,
                    error = %e,
                    "Failed to add rotated secret to recogniser"
                );
            }
        }
        self.forget(&plan.dead).await;

        self.state.lock().buckets = plan.buckets;
        debug!(
            dead = plan.dead.len(),
            created = plan.created.len(),
            "Rotated transport keys"
        );
    }

    /// Register a new endpoint from its initial (period 0) secret.
    ///
    /// The epoch must lie at least one rotation period in the past so the
    /// previous period exists. The initial secret is consumed and erased.
    pub async fn endpoint_added(
        &self,
        endpoint: Endpoint,
        initial_secret: SecretKey,
    ) -> Result<(), KeyManagerError> {
        let _writer = self.writer.lock().await;
        let key = endpoint.key();
        let latency = {
            let state = self.state.lock();
            if state.buckets.contains_key(&key) {
                return Err(KeyManagerError::DuplicateEndpoint {
                    contact: key.contact,
                    transport: key.transport,
                });
            }
            state.latencies.get(&endpoint.transport).copied()
        }
        .ok_or_else(|| KeyManagerError::MissingLatency(endpoint.transport.clone()))?;

        let schedule = RotationSchedule::new(self.config.max_clock_difference_ms, latency)?;
        let now = self.time_source.now();
        match schedule.current_period(endpoint.epoch, now) {
            Some(period) if period >= 1 => {}
            _ => {
                return Err(KeyManagerError::EpochTooRecent {
                    epoch: endpoint.epoch,
                    now,
                })
            }
        }

        let latencies = HashMap::from([(endpoint.transport.clone(), latency)]);
        let initial = TemporarySecret::new(endpoint, 0, initial_secret);
        let plan = plan_rotation(
            now,
            vec![initial],
            &latencies,
            self.config.max_clock_difference_ms,
        )?;

        let secrets: Vec<TemporarySecret> = plan.buckets.incoming().cloned().collect();
        self.store.add_secrets(&secrets).await?;
        for secret in &secrets {
            self.recogniser.add_secret(secret)?;
        }
        self.state.lock().buckets.merge(plan.buckets);

        info!(
            contact = %key.contact,
            transport = %key.transport,
            periods = ?secrets.iter().map(|s| s.period).collect::<Vec<_>>(),
            "Endpoint added"
        );
        Ok(())
    }

    /// Forget one endpoint, leaving the contact's other transports alone.
    /// Removing an unknown endpoint is a no-op.
    pub async fn endpoint_removed(&self, key: &EndpointKey) -> Result<(), KeyManagerError> {
        let _writer = self.writer.lock().await;
        let periods: Vec<u32> = {
            let mut state = self.state.lock();
            let periods = state
                .buckets
                .incoming()
                .filter(|s| &s.key() == key)
                .map(|s| s.period)
                .collect();
            state.buckets.remove_matching(|k| k == key);
            periods
        };
        for &period in &periods {
            self.recogniser
                .remove_secret(key.contact, &key.transport, period);
            self.store.remove_secret(key, period).await?;
        }
        info!(
            contact = %key.contact,
            transport = %key.transport,
            periods = ?periods,
            "Endpoint removed"
        );
        Ok(())
    }

    /// Context for a new outgoing connection to `contact` over `transport`.
    ///
    /// `Ok(None)` means no outgoing secret exists yet.
    pub async fn get_connection_context(
        &self,
        contact: ContactId,
        transport: &TransportId,
    ) -> Result<Option<ConnectionContext>, KeyManagerError> {
        let key = EndpointKey {
            contact,
            transport: transport.clone(),
        };
        let (period, secret, alice) = {
            let state = self.state.lock();
            match state.buckets.outgoing_secret(&key) {
                Some(s) => (s.period, s.secret.clone(), s.alice()),
                None => return Ok(None),
            }
        };

        let connection = match self.store.increment_connection_counter(&key, period).await {
            Ok(connection) => connection,
            // Rotated away between the lookup and the increment.
            Err(StoreError::SecretNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let connection = check_u32("connection number", connection)?;

        debug!(contact = %contact, transport = %transport, period, connection, "Outgoing connection");
        Ok(Some(ConnectionContext {
            contact,
            transport: transport.clone(),
            secret,
            connection,
            alice,
        }))
    }

    /// React to a bus event. Events that do not concern keys are ignored.
    pub async fn handle_event(&self, event: &BrambleEvent) -> Result<(), KeyManagerError> {
        match event {
            BrambleEvent::ContactRemoved { contact } => self.remove_contact(*contact).await,
            BrambleEvent::TransportRemoved { transport } => self.remove_transport(transport).await,
            BrambleEvent::TransportLatencyChanged {
                transport,
                max_latency_ms,
            } => self.set_transport_latency(transport, *max_latency_ms).await,
            BrambleEvent::KeyAgreementListening { .. }
            | BrambleEvent::KeyAgreementWaiting { .. }
            | BrambleEvent::KeyAgreementStarted { .. }
            | BrambleEvent::KeyAgreementFinished { .. }
            | BrambleEvent::KeyAgreementAborted { .. }
            | BrambleEvent::KeyAgreementFailed { .. } => Ok(()),
        }
    }

    async fn remove_contact(&self, contact: ContactId) -> Result<(), KeyManagerError> {
        let _writer = self.writer.lock().await;
        self.recogniser.remove_secrets_for_contact(contact);
        let removed = self.state.lock().buckets.remove_contact(contact);
        self.store.remove_secrets_for_contact(contact).await?;
        info!(contact = %contact, removed, "Removed contact secrets");
        Ok(())
    }

    async fn remove_transport(&self, transport: &TransportId) -> Result<(), KeyManagerError> {
        let _writer = self.writer.lock().await;
        self.recogniser.remove_secrets_for_transport(transport);
        let removed = {
            let mut state = self.state.lock();
            state.latencies.remove(transport);
            state.buckets.remove_transport(transport)
        };
        self.store.remove_secrets_for_transport(transport).await?;
        info!(transport = %transport, removed, "Removed transport secrets");
        Ok(())
    }

    /// Record a transport's latency bound. It applies to new endpoints and
    /// to every rebuild from now on.
    pub async fn set_transport_latency(
        &self,
        transport: &TransportId,
        max_latency_ms: u64,
    ) -> Result<(), KeyManagerError> {
        let _writer = self.writer.lock().await;
        RotationSchedule::new(self.config.max_clock_difference_ms, max_latency_ms)?;
        self.store
            .set_transport_latency(transport, max_latency_ms)
            .await?;
        self.state
            .lock()
            .latencies
            .insert(transport.clone(), max_latency_ms);
        debug!(transport = %transport, max_latency_ms, "Transport latency recorded");
        Ok(())
    }

    /// Stop the timer, clear the recogniser and erase every in-memory
    /// secret. Persisted secrets are kept.
    pub async fn stop(&self) {
        let _writer = self.writer.lock().await;
        self.shutdown.send_replace(true);
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        self.recogniser.remove_all_secrets();
        let mut state = self.state.lock();
        state.buckets.clear();
        state.started = false;
        info!("Key manager stopped");
    }

    /// Periods held for an endpoint: (older incoming, newer incoming, outgoing).
    pub fn periods(
        &self,
        contact: ContactId,
        transport: &TransportId,
    ) -> (Option<u32>, Option<u32>, Option<u32>) {
        let key = EndpointKey {
            contact,
            transport: transport.clone(),
        };
        let state = self.state.lock();
        (
            state.buckets.older_incoming.get(&key).map(|s| s.period),
            state.buckets.newer_incoming.get(&key).map(|s| s.period),
            state.buckets.outgoing.get(&key).copied(),
        )
    }

    /// Drop forgotten secrets from the store. Failures are logged: the
    /// secrets are already out of memory and will be forgotten again on
    /// the next load.
    async fn forget(&self, dead: &[TemporarySecret]) {
        for secret in dead {
            if let Err(e) = self.store.remove_secret(&secret.key(), secret.period).await {
                warn!(
                    contact = %secret.contact(),
                    transport = %secret.transport(),
                    period = secret.period,
                    error = %e,
                    "Failed to remove dead secret"
                );
            }
        }
    }

    fn spawn_rotation_timer(self: &Arc<Self>) {
        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();
        let manager = Arc::downgrade(self);
        let period = self.config.rotation_check_interval();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if let Err(e) = manager.rotate_keys().await {
                    warn!(error = %e, "Key rotation failed");
                }
            }
            debug!("Rotation timer stopped");
        });
        *self.timer.lock() = Some(handle);
    }
}
