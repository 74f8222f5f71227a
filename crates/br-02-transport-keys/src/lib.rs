//! # Transport Keys Subsystem (BR-02)
//!
//! Per-contact secret lifecycle after key agreement: forward-secret
//! rotation of transport secrets and tag-based recognition of incoming
//! connections.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): rotation schedule, lifecycle
//!   classification, connection windows, errors
//! - **Ports Layer** (`ports/`): `SecretStore` persistence, `TimeSource`
//! - **Recogniser** (`recogniser`): precomputed tag index per transport
//! - **Service** (`service/`): `KeyManager`, rotation timer, event handling
//! - **Adapters** (`adapters/`): in-memory secret store
//!
//! ## Secret Lifecycle
//!
//! ```text
//!   period p-1 ──► older incoming ──┐
//!                                   ├──► recogniser (tags)
//!   period p   ──► newer incoming ──┘
//!                      │
//!                      └──► outgoing (after activation) ──► ConnectionContext
//! ```
//!
//! Every rotation period, `2 * max_clock_difference + max_latency`, the
//! oldest secret dies and the next one is derived from its successor.
//! Secrets are zeroed when dropped.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod recogniser;
pub mod service;

/// Deterministic time source. Requires feature `test-utils` outside this
/// crate's own tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::InMemorySecretStore;
pub use config::KeyManagerConfig;
pub use domain::{
    classify, ConnectionWindow, KeyManagerError, Lifecycle, RecogniserError, RotationSchedule,
    StoreError, WINDOW_SIZE,
};
pub use ports::{SecretStore, SystemTimeSource, TimeSource};
pub use recogniser::ConnectionRecogniser;
pub use service::KeyManager;

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::FixedTimeSource;
