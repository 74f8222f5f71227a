//! # Key Derivation
//!
//! Counter-mode KDF (NIST SP 800-108) with HMAC-SHA256 as the PRF. Each
//! derivation produces exactly one 32-byte block:
//!
//! ```text
//! HMAC(secret, counter:u32 BE = 0 || label || 0x00 || context:u32 BE || 256:u32 BE)
//! ```
//!
//! ## Derivations
//!
//! | Label | Context | Produces |
//! |-------|---------|----------|
//! | `ROTATE` | period | secret for the following period |
//! | `FIRST` | transport index | first secret of a transport |
//! | `A_TAG` / `B_TAG` | 0 | tag key, by initiator role |
//! | `A_FRAME_A` .. `B_FRAME_B` | connection | frame key, by initiator role and direction |
//!
//! Secrets that are all zero are refused: they are either erased or were
//! never initialised, and deriving from them would silently produce keys an
//! attacker can compute.

use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared_types::{check_u32, SecretKey, SECRET_KEY_LENGTH};
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

const OUTPUT_BITS: u32 = (SECRET_KEY_LENGTH * 8) as u32;

const ROTATE: &[u8] = b"ROTATE";
const FIRST: &[u8] = b"FIRST";
const A_TAG: &[u8] = b"A_TAG";
const B_TAG: &[u8] = b"B_TAG";
const A_FRAME_A: &[u8] = b"A_FRAME_A";
const A_FRAME_B: &[u8] = b"A_FRAME_B";
const B_FRAME_A: &[u8] = b"B_FRAME_A";
const B_FRAME_B: &[u8] = b"B_FRAME_B";

/// One block of counter-mode output.
pub fn counter_mode_kdf(
    secret: &SecretKey,
    label: &[u8],
    context: u32,
) -> Result<SecretKey, CryptoError> {
    if secret.is_all_zero() {
        return Err(CryptoError::ZeroSecret);
    }
    let mut prf = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: SECRET_KEY_LENGTH,
            actual: secret.as_bytes().len(),
        }
    })?;
    prf.update(&0u32.to_be_bytes());
    prf.update(label);
    prf.update(&[0u8]);
    prf.update(&context.to_be_bytes());
    prf.update(&OUTPUT_BITS.to_be_bytes());
    let mut block: [u8; SECRET_KEY_LENGTH] = prf.finalize().into_bytes().into();
    let key = SecretKey::from_bytes(block);
    block.zeroize();
    Ok(key)
}

/// Derive a single-purpose key from `secret` under `label`.
pub fn derive_key(label: &str, secret: &SecretKey) -> Result<SecretKey, CryptoError> {
    counter_mode_kdf(secret, label.as_bytes(), 0)
}

/// Secret for rotation period `period + 1`, given the secret for `period`.
pub fn derive_next_secret(secret: &SecretKey, period: u64) -> Result<SecretKey, CryptoError> {
    let period = check_u32("rotation period", period)?;
    counter_mode_kdf(secret, ROTATE, period)
}

/// First secret (period 0) of the transport at `transport_index`, derived
/// from the master secret agreed by BQP.
pub fn derive_initial_secret(
    master: &SecretKey,
    transport_index: u32,
) -> Result<SecretKey, CryptoError> {
    counter_mode_kdf(master, FIRST, transport_index)
}

/// Key used to encode tags for connections initiated by Alice (`alice`)
/// or by Bob.
pub fn derive_tag_key(secret: &SecretKey, alice: bool) -> Result<SecretKey, CryptoError> {
    counter_mode_kdf(secret, if alice { A_TAG } else { B_TAG }, 0)
}

/// Frame key for one direction of one connection.
///
/// `alice` names the role of the connection's initiator; `initiator`
/// selects the initiator-to-responder direction.
pub fn derive_frame_key(
    secret: &SecretKey,
    connection: u64,
    alice: bool,
    initiator: bool,
) -> Result<SecretKey, CryptoError> {
    let connection = check_u32("connection number", connection)?;
    let label = match (alice, initiator) {
        (true, true) => A_FRAME_A,
        (true, false) => A_FRAME_B,
        (false, true) => B_FRAME_A,
        (false, false) => B_FRAME_B,
    };
    counter_mode_kdf(secret, label, connection)
}
