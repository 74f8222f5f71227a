//! # Stream Crypto Subsystem (BR-03)
//!
//! Authenticated encryption for established transport connections, one
//! independent cipher per direction.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): frame layout, IV and AAD construction, errors
//! - **Layers** (`outgoing`, `incoming`): frame-at-a-time AEAD over async I/O
//! - **Streams** (`stream`): byte-oriented writer and reader on top of the layers
//! - **Factory** (`factory`): derives tag and frame keys from a `ConnectionContext`
//!
//! ## Security Notes
//!
//! - IVs and AAD are derived from a 32-bit frame counter that never repeats
//!   under one key; the counter is refused once exhausted.
//! - Header and payload are sealed together, so lengths cannot be altered.
//! - Padding must be zero and non-final frames must be full length.
//! - An initiator that never writes data never sends its tag.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod factory;
pub mod incoming;
pub mod outgoing;
pub mod stream;


pub use config::FrameConfig;
pub use domain::{max_payload_length, FrameError, FrameHeader, HEADER_LENGTH};
pub use factory::StreamFactory;
pub use incoming::{read_tag, IncomingEncryptionLayer};
pub use outgoing::OutgoingEncryptionLayer;
pub use stream::{StreamReader, StreamWriter};
