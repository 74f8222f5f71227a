//! # Node Runtime Library
//!
//! Composition root for the Bramble session layer. The `main.rs` binary is a
//! thin shell around [`NodeRuntime`].
//!
//! ## Modular Structure
//!
//! - `container/` - configuration and the component instances, built once
//! - `wiring/` - event routing between components
//! - `runtime` - startup, shutdown and the node-level operations
//!
//! ## Component Graph
//!
//! ```text
//!   DuplexPlugins ──► KeyAgreementTask ──► master secret
//!                                              │ add_contact_from_agreement
//!                                              ▼
//!   SecretStore ◄──── KeyManager ──────► ConnectionRecogniser
//!                        ▲  │ ConnectionContext
//!        EVENT BUS ──────┘  ▼
//!                        StreamFactory ──► frames
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod container;
pub mod errors;
pub mod runtime;
pub mod wiring;

pub use container::{ConfigError, LoggingConfig, NodeConfig, SubsystemContainer};
pub use errors::NodeError;
pub use runtime::NodeRuntime;
