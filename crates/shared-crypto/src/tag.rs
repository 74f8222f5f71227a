//! # Recognition Tags
//!
//! A tag is the connection number (32-bit big-endian) in an otherwise zero
//! 16-byte block, encrypted with AES-256 under the tag key. Without the tag
//! key a tag is indistinguishable from random bytes.

use crate::CryptoError;
use aes_gcm::aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes_gcm::aes::Aes256;
use shared_types::{check_u32, SecretKey, Tag, TAG_LENGTH};

/// Encode the tag for `connection` under `tag_key`.
pub fn encode_tag(tag_key: &SecretKey, connection: u64) -> Result<Tag, CryptoError> {
    let connection = check_u32("connection number", connection)?;
    let cipher = Aes256::new(GenericArray::from_slice(tag_key.as_bytes()));
    let mut block = GenericArray::from([0u8; TAG_LENGTH]);
    block[..4].copy_from_slice(&connection.to_be_bytes());
    cipher.encrypt_block(&mut block);
    let mut tag = [0u8; TAG_LENGTH];
    tag.copy_from_slice(&block);
    Ok(tag)
}
