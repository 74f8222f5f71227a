//! # Shared Bus - Event Bus for Session-Layer Notifications
//!
//! Decouples the components that produce notifications (key-agreement
//! tasks, contact and transport management) from those that react to them
//! (the key manager, the UI layer).
//!
//! ```text
//! ┌──────────────────┐                    ┌──────────────────┐
//! │ KeyAgreementTask │                    │   KeyManager     │
//! │                  │    publish()       │                  │
//! │                  │ ──────┐            │                  │
//! └──────────────────┘       │            └──────────────────┘
//!                            ▼                    ↑
//!                      ┌──────────────┐          │
//!                      │  Event Bus   │          │
//!                      │              │ ─────────┘
//!                      └──────────────┘  subscribe()
//! ```
//!
//! Events are a closed enumeration ([`BrambleEvent`]); subscribers match it
//! exhaustively.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{BrambleEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the slowest one lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
