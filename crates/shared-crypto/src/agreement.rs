//! # Ephemeral Key Agreement
//!
//! X25519 key pairs, commitments, and the secrets derived during BQP:
//!
//! 1. `commitment = H("COMMIT", public)[..16]`, advertised before the key.
//! 2. `shared = H("SHARED_SECRET", X25519(ours, theirs), version, alice_pub, bob_pub)`
//! 3. `confirm = MAC_{KDF("CONFIRMATION_KEY", shared)}(first side, second side)`
//!    where Alice's record lists Alice's payload and key first, Bob's record
//!    lists Bob's first.
//! 4. `master = KDF("MASTER_SECRET", shared)`
//!
//! ## Security Properties
//!
//! - A low-order peer key yields an all-zero X25519 output and is rejected.
//! - Confirmation records are not interchangeable between roles, so a
//!   reflected record never verifies.
//! - Confirmation and commitment checks compare in constant time.

use crate::hashing::{hash, mac, Hash};
use crate::kdf::derive_key;
use crate::CryptoError;
use rand::rngs::OsRng;
use shared_types::{Commitment, SecretKey, COMMIT_LENGTH};
use std::fmt;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};

/// Length of an X25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of a confirmation record.
pub const CONFIRMATION_LENGTH: usize = 32;

const COMMIT_LABEL: &str = "bramble/COMMIT";
const SHARED_SECRET_LABEL: &str = "bramble/SHARED_SECRET";
const CONFIRMATION_KEY_LABEL: &str = "bramble/CONFIRMATION_KEY";
const CONFIRMATION_MAC_LABEL: &str = "bramble/CONFIRMATION_MAC";
const MASTER_SECRET_LABEL: &str = "bramble/MASTER_SECRET";

/// X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgreementPublicKey([u8; PUBLIC_KEY_LENGTH]);

impl AgreementPublicKey {
    /// Create from bytes received off the wire.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }
}

/// Ephemeral X25519 key pair. The private half is zeroed on drop.
pub struct AgreementKeyPair {
    secret: StaticSecret,
    public: AgreementPublicKey,
}

impl AgreementKeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Rebuild a key pair from its private scalar.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = AgreementPublicKey(PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    pub fn public(&self) -> &AgreementPublicKey {
        &self.public
    }

    /// Raw X25519 output. Fails if the peer's key is a low-order point.
    fn agree(&self, theirs: &AgreementPublicKey) -> Result<SecretKey, CryptoError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(theirs.0));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(SecretKey::from_bytes(*shared.as_bytes()))
    }
}

impl fmt::Debug for AgreementKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgreementKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Commitment to `public`.
pub fn derive_commitment(public: &AgreementPublicKey) -> Commitment {
    let digest = hash(COMMIT_LABEL, &[public.as_bytes()]);
    let mut commit = [0u8; COMMIT_LENGTH];
    commit.copy_from_slice(&digest[..COMMIT_LENGTH]);
    Commitment(commit)
}

/// Does `public` open `commitment`?
pub fn verify_commitment(commitment: &Commitment, public: &AgreementPublicKey) -> bool {
    derive_commitment(public)
        .as_bytes()
        .ct_eq(commitment.as_bytes())
        .into()
}

/// Shared secret for the handshake.
pub fn derive_shared_secret(
    ours: &AgreementKeyPair,
    theirs: &AgreementPublicKey,
    alice: bool,
    protocol_version: u8,
) -> Result<SecretKey, CryptoError> {
    let raw = ours.agree(theirs)?;
    let (alice_pub, bob_pub) = if alice {
        (ours.public(), theirs)
    } else {
        (theirs, ours.public())
    };
    let digest = hash(
        SHARED_SECRET_LABEL,
        &[
            raw.as_bytes(),
            &[protocol_version],
            alice_pub.as_bytes(),
            bob_pub.as_bytes(),
        ],
    );
    Ok(SecretKey::from_bytes(digest))
}

/// Both sides' serialized payloads and public keys, from the local view.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationInputs<'a> {
    pub our_payload: &'a [u8],
    pub their_payload: &'a [u8],
    pub our_public: &'a AgreementPublicKey,
    pub their_public: &'a AgreementPublicKey,
}

/// Confirmation record.
///
/// `alice` is the local role; `alice_record` selects whose record is being
/// computed (the one Alice sends, or the one Bob sends).
pub fn derive_confirmation_record(
    shared: &SecretKey,
    inputs: &ConfirmationInputs<'_>,
    alice: bool,
    alice_record: bool,
) -> Result<Hash, CryptoError> {
    let confirmation_key = derive_key(CONFIRMATION_KEY_LABEL, shared)?;
    let ours = (inputs.our_payload, inputs.our_public.as_bytes().as_slice());
    let theirs = (inputs.their_payload, inputs.their_public.as_bytes().as_slice());
    let (alice_side, bob_side) = if alice { (ours, theirs) } else { (theirs, ours) };
    let (first, second) = if alice_record {
        (alice_side, bob_side)
    } else {
        (bob_side, alice_side)
    };
    Ok(mac(
        CONFIRMATION_MAC_LABEL,
        &confirmation_key,
        &[first.0, first.1, second.0, second.1],
    ))
}

/// Constant-time comparison of a received confirmation record.
pub fn verify_confirmation_record(expected: &Hash, received: &[u8]) -> bool {
    received.len() == expected.len() && bool::from(expected.as_slice().ct_eq(received))
}

/// Master secret handed to the key manager once the handshake succeeds.
pub fn derive_master_secret(shared: &SecretKey) -> Result<SecretKey, CryptoError> {
    derive_key(MASTER_SECRET_LABEL, shared)
}
