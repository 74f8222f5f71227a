//! # Bramble Events
//!
//! Defines all event types that flow through the shared bus. The enumeration
//! is closed: consumers match it exhaustively instead of downcasting.

use serde::{Deserialize, Serialize};
use shared_types::{ContactId, Payload, TransportId};
use uuid::Uuid;

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrambleEvent {
    // =========================================================================
    // KEY AGREEMENT
    // =========================================================================
    /// The task is listening and advertises `payload` to the peer.
    KeyAgreementListening { task: Uuid, payload: Payload },

    /// Responder side: a connection was accepted but the initiator has not
    /// sent anything yet.
    KeyAgreementWaiting { task: Uuid },

    /// The first handshake record arrived from the peer.
    KeyAgreementStarted { task: Uuid },

    /// Handshake completed. The master secret goes to the task's caller only.
    KeyAgreementFinished {
        task: Uuid,
        transport: TransportId,
        alice: bool,
    },

    /// Handshake aborted; `remote` is true if the peer sent the abort.
    KeyAgreementAborted { task: Uuid, remote: bool },

    /// No connection could be established, or it failed before completing.
    KeyAgreementFailed { task: Uuid },

    // =========================================================================
    // CONTACTS
    // =========================================================================
    /// A contact and everything keyed by it was deleted.
    ContactRemoved { contact: ContactId },

    // =========================================================================
    // TRANSPORTS
    // =========================================================================
    /// A transport was removed; its secrets must go with it.
    TransportRemoved { transport: TransportId },

    /// A transport declared a new maximum latency (milliseconds).
    TransportLatencyChanged {
        transport: TransportId,
        max_latency_ms: u64,
    },
}

impl BrambleEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::KeyAgreementListening { .. }
            | Self::KeyAgreementWaiting { .. }
            | Self::KeyAgreementStarted { .. }
            | Self::KeyAgreementFinished { .. }
            | Self::KeyAgreementAborted { .. }
            | Self::KeyAgreementFailed { .. } => EventTopic::KeyAgreement,
            Self::ContactRemoved { .. } => EventTopic::Contacts,
            Self::TransportRemoved { .. } | Self::TransportLatencyChanged { .. } => {
                EventTopic::Transports
            }
        }
    }

    /// Key-agreement task that emitted this event, if any.
    #[must_use]
    pub fn task(&self) -> Option<Uuid> {
        match self {
            Self::KeyAgreementListening { task, .. }
            | Self::KeyAgreementWaiting { task }
            | Self::KeyAgreementStarted { task }
            | Self::KeyAgreementFinished { task, .. }
            | Self::KeyAgreementAborted { task, .. }
            | Self::KeyAgreementFailed { task } => Some(*task),
            Self::ContactRemoved { .. }
            | Self::TransportRemoved { .. }
            | Self::TransportLatencyChanged { .. } => None,
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Key-agreement task notifications.
    KeyAgreement,
    /// Contact lifecycle.
    Contacts,
    /// Transport lifecycle.
    Transports,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Only events from this key-agreement task, if set.
    pub task: Option<Uuid>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics, task: None }
    }

    /// Create a filter for the events of one key-agreement task.
    #[must_use]
    pub fn for_task(task: Uuid) -> Self {
        Self {
            topics: vec![EventTopic::KeyAgreement],
            task: Some(task),
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &BrambleEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let task_match = match self.task {
            None => true,
            Some(task) => event.task() == Some(task),
        };

        topic_match && task_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_topic_mapping() {
        let event = BrambleEvent::KeyAgreementStarted { task: Uuid::nil() };
        assert_eq!(event.topic(), EventTopic::KeyAgreement);

        let event = BrambleEvent::ContactRemoved {
            contact: ContactId(3),
        };
        assert_eq!(event.topic(), EventTopic::Contacts);
        assert_eq!(event.task(), None);
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        let event = BrambleEvent::TransportRemoved {
            transport: TransportId::new("lan"),
        };
        assert!(filter.matches(&event));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Contacts]);
        assert!(filter.matches(&BrambleEvent::ContactRemoved {
            contact: ContactId(1)
        }));
        assert!(!filter.matches(&BrambleEvent::KeyAgreementFailed { task: Uuid::nil() }));
    }

    #[test]
    fn test_filter_by_task() {
        let mine = Uuid::new_v4();
        let filter = EventFilter::for_task(mine);
        assert!(filter.matches(&BrambleEvent::KeyAgreementWaiting { task: mine }));
        assert!(!filter.matches(&BrambleEvent::KeyAgreementWaiting {
            task: Uuid::new_v4()
        }));
        assert!(!filter.matches(&BrambleEvent::ContactRemoved {
            contact: ContactId(1)
        }));
    }
}
