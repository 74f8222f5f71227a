//! # Labelled Hashing
//!
//! BLAKE3 hashing and keyed hashing (MAC) over length-prefixed inputs.
//!
//! Every hash is domain-separated by a label. The label and each input are
//! preceded by their length as a 32-bit big-endian integer, so no two
//! different input lists can produce the same byte stream.

use blake3::Hasher;
use shared_types::SecretKey;

/// BLAKE3 output (256-bit).
pub type Hash = [u8; 32];

/// Streaming hasher that length-prefixes everything it absorbs.
pub struct LabelledHasher {
    inner: Hasher,
}

impl LabelledHasher {
    /// Plain hasher for `label`.
    pub fn new(label: &str) -> Self {
        Self::start(Hasher::new(), label)
    }

    /// Keyed hasher for `label` (for MACs).
    pub fn new_keyed(label: &str, key: &SecretKey) -> Self {
        Self::start(Hasher::new_keyed(key.as_bytes()), label)
    }

    fn start(inner: Hasher, label: &str) -> Self {
        let mut hasher = Self { inner };
        hasher.update(label.as_bytes());
        hasher
    }

    /// Absorb one length-prefixed input.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        // Inputs here are keys, payloads and protocol bytes, all far below 4 GiB.
        let len = data.len() as u32;
        self.inner.update(&len.to_be_bytes());
        self.inner.update(data);
        self
    }

    pub fn finalize(&self) -> Hash {
        *self.inner.finalize().as_bytes()
    }
}

/// Hash `inputs` under `label`.
pub fn hash(label: &str, inputs: &[&[u8]]) -> Hash {
    let mut hasher = LabelledHasher::new(label);
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize()
}

/// MAC `inputs` under `label` with `key`.
pub fn mac(label: &str, key: &SecretKey, inputs: &[&[u8]]) -> Hash {
    let mut hasher = LabelledHasher::new_keyed(label, key);
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize()
}
