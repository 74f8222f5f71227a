//! # Shared Types Crate
//!
//! Value types shared by the key-agreement, transport-key and stream-crypto
//! subsystems.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: identifiers and secret records are defined
//!   once here and passed between subsystems by value.
//! - **Erasable Secrets**: every buffer holding key material is a
//!   [`SecretKey`], which zeroes itself on drop and never prints its bytes.
//! - **32-bit Bounds**: rotation periods and connection numbers are checked
//!   against the unsigned 32-bit range at the edges ([`check_u32`]).

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod errors;
pub mod payload;
pub mod secrets;

pub use entities::*;
pub use errors::*;
pub use payload::*;
pub use secrets::*;
