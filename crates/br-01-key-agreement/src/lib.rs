//! # Key Agreement Subsystem (BR-01)
//!
//! Two devices that have scanned each other's payload race connections
//! over every transport they share, pick one, and run the BQP handshake on
//! it to agree a master secret.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): record header, payload codec, roles, errors
//! - **Ports Layer** (`ports/`): `DuplexPlugin`, `KeyAgreementListener`,
//!   `TransportConnection`
//! - **Codec** (`codec`): length-prefixed records over a connection
//! - **Connector** (`connector`, `chooser`): listening, retrying outgoing
//!   attempts, first-usable-connection selection
//! - **Protocol** (`protocol`): the key / confirm exchange
//! - **Task** (`task`): one pairing attempt end to end, with bus events
//! - **Adapters** (`adapters/`): in-memory network and plugin
//!
//! ## Flow
//!
//! ```text
//!   task.listen() ──► payload shown to peer (QR code)
//!         │
//!   task.connect_and_run(peer payload)
//!         ├── Role::assign: smaller payload is Alice
//!         ├── connector.connect ──► chosen KeyAgreementConnection
//!         └── protocol.perform ──► master secret (caller only)
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod chooser;
pub mod codec;
pub mod config;
pub mod connection;
pub mod connector;
pub mod domain;
pub mod notifier;
pub mod ports;
pub mod protocol;
pub mod task;

pub use chooser::ConnectionChooser;
pub use codec::{read_record, write_record, HandshakeTransport};
pub use config::ConnectorConfig;
pub use connection::KeyAgreementConnection;
pub use connector::KeyAgreementConnector;
pub use domain::{
    decode_payload, encode_payload, AbortKind, KeyAgreementError, PayloadError, RecordType, Role,
    PROTOCOL_VERSION,
};
pub use notifier::Notifier;
pub use ports::{DuplexPlugin, KeyAgreementListener, TransportConnection};
pub use protocol::{HandshakeInputs, KeyAgreementProtocol, KeyAgreementResult, ProtocolState};
pub use task::KeyAgreementTask;
