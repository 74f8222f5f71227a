//! # Shared Crypto - Secret Derivation Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | BLAKE3 (length-prefixed, labelled) | Commitments, shared secrets, confirmation MACs |
//! | `kdf` | HMAC-SHA256 counter mode | Next-period secrets, tag keys, frame keys |
//! | `tag` | AES-256 single block | Connection recognition tags |
//! | `agreement` | X25519 | Ephemeral BQP key pairs |
//! | `symmetric` | XChaCha20-Poly1305 | Frame encryption |
//!
//! ## Security Properties
//!
//! - Secrets travel as `shared_types::SecretKey`, zeroed on drop
//! - All-zero secrets and out-of-range counters are rejected before use
//! - Every hash and KDF output is domain-separated by a label

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod agreement;
pub mod errors;
pub mod hashing;
pub mod kdf;
pub mod symmetric;
pub mod tag;

// Re-exports
pub use agreement::{
    derive_commitment, derive_confirmation_record, derive_master_secret, derive_shared_secret,
    verify_commitment, verify_confirmation_record, AgreementKeyPair, AgreementPublicKey,
    ConfirmationInputs, CONFIRMATION_LENGTH, PUBLIC_KEY_LENGTH,
};
pub use errors::CryptoError;
pub use hashing::{hash, mac, Hash, LabelledHasher};
pub use kdf::{derive_frame_key, derive_initial_secret, derive_key, derive_next_secret, derive_tag_key};
pub use symmetric::{FrameCipher, IV_LENGTH, MAC_LENGTH};
pub use tag::encode_tag;
