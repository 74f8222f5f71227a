//! # Event Publisher
//!
//! Key-agreement tasks report progress and the contact/transport owners
//! announce deletions through [`EventPublisher`]. Delivery is best effort:
//! an event published while nobody listens is dropped, and a subscriber
//! that falls more than the channel capacity behind loses the oldest events.

use crate::events::{BrambleEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Broadcast `event`, returning how many subscribers were handed a copy.
    /// Filters are applied on the receiving side, so the count includes
    /// subscribers that will skip it.
    async fn publish(&self, event: BrambleEvent) -> usize;
}

/// Broadcast bus shared by `Arc` from the composition root.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<BrambleEvent>,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Only events published after this call are seen.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, task = ?filter.task, "Subscribed to event bus");
        Subscription::new(self.sender.subscribe(), filter)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: BrambleEvent) -> usize {
        let topic = event.topic();
        let task = event.task();

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(topic = ?topic, task = ?task, receivers, "Event published");
                receivers
            }
            Err(_) => {
                trace!(topic = ?topic, task = ?task, "Event dropped, no subscribers");
                0
            }
        }
    }
}
