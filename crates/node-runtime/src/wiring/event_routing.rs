//! # Event Routing
//!
//! Delivers contact and transport lifecycle events from the bus to the key
//! manager.
//!
//! ```text
//!  remove_contact / remove_transport / set_transport_latency
//!        │ publish
//!        ▼
//!   EVENT BUS ──[Contacts, Transports]──► KeyEventRouter ──► KeyManager::handle_event
//!        │
//!        └──[KeyAgreement]──► UI subscribers (not routed here)
//! ```
//!
//! The subscription is taken when the router is built, so events published
//! after `NodeRuntime::start` returns are never missed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use br_02_transport_keys::KeyManager;
use shared_bus::{BrambleEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};

pub struct KeyEventRouter {
    key_manager: Arc<KeyManager>,
    subscription: Subscription,
}

impl KeyEventRouter {
    pub fn new(bus: &InMemoryEventBus, key_manager: Arc<KeyManager>) -> Self {
        let subscription =
            bus.subscribe(EventFilter::topics(vec![EventTopic::Contacts, EventTopic::Transports]));
        Self {
            key_manager,
            subscription,
        }
    }

    /// Route events until shutdown is signalled or the bus goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = self.subscription.recv() => match event {
                    Some(event) => self.route(&event).await,
                    None => {
                        debug!("Event bus closed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("[router] Shutdown signal received");
                    break;
                }
            }
        }
    }

    async fn route(&self, event: &BrambleEvent) {
        debug!(?event, "Routing event to key manager");
        // A failed removal leaves the store as it was; the next event or
        // restart retries from persisted state.
        if let Err(e) = self.key_manager.handle_event(event).await {
            warn!(error = %e, ?event, "Key manager failed to handle event");
        }
    }
}
