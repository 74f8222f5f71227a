//! Runtime errors: every component error the composition root can surface.

use br_01_key_agreement::KeyAgreementError;
use br_02_transport_keys::KeyManagerError;
use br_03_stream_crypto::FrameError;
use shared_crypto::CryptoError;
use shared_types::TransportId;
use thiserror::Error;

use crate::container::ConfigError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("two plugins registered for transport {0}")]
    DuplicateTransport(TransportId),

    #[error("no key-agreement capable transport registered")]
    NoKeyAgreementTransport,

    #[error(transparent)]
    KeyAgreement(#[from] KeyAgreementError),

    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
