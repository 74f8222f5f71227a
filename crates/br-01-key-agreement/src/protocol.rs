//! # BQP Protocol
//!
//! The authenticated handshake run over the chosen connection.
//!
//! ```text
//!  Alice                                   Bob
//!    │ ── KEY (alice public key) ─────────► │  check against Alice's commitment
//!    │ ◄───────── KEY (bob public key) ──── │
//!    │  check against Bob's commitment      │
//!    │        shared secret (both sides)    │
//!    │ ── CONFIRM (alice record) ─────────► │  verify
//!    │ ◄───────── CONFIRM (bob record) ──── │
//!    │  verify                              │
//!    │        master secret (both sides)    │
//! ```
//!
//! Bob receives before sending at every step, so the two sides never wait
//! on each other for the same record. Any failed check aborts: the side
//! that noticed sends an `ABORT` record (best effort) and closes the
//! connection.

use crate::codec::HandshakeTransport;
use crate::connection::KeyAgreementConnection;
use crate::domain::{
    encode_payload, AbortKind, KeyAgreementError, PayloadError, Role, PROTOCOL_VERSION,
};
use crate::notifier::Notifier;
use shared_crypto::{
    derive_confirmation_record, derive_master_secret, derive_shared_secret,
    verify_commitment, verify_confirmation_record, AgreementKeyPair, AgreementPublicKey,
    ConfirmationInputs, CryptoError,
};
use shared_types::{Commitment, Payload, SecretKey, TransportId};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Start,
    KeySent,
    KeyReceived,
    SharedSecretDerived,
    ConfirmSent,
    ConfirmReceived,
    MasterDerived,
    Aborted,
}

/// Both payloads as they went over the wire, plus our role.
#[derive(Debug, Clone)]
pub struct HandshakeInputs {
    our_payload: Vec<u8>,
    their_payload: Vec<u8>,
    their_commitment: Commitment,
    role: Role,
}

impl HandshakeInputs {
    pub fn new(ours: &Payload, theirs: &Payload, role: Role) -> Result<Self, PayloadError> {
        Ok(Self {
            our_payload: encode_payload(ours)?,
            their_payload: encode_payload(theirs)?,
            their_commitment: *theirs.commitment(),
            role,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Successful handshake. The caller owns the connection and must dispose
/// of it.
#[derive(Debug)]
pub struct KeyAgreementResult {
    pub master_secret: SecretKey,
    pub connection: KeyAgreementConnection,
    pub transport: TransportId,
    pub alice: bool,
}

pub struct KeyAgreementProtocol<'a> {
    notifier: Notifier,
    transport: HandshakeTransport,
    key_pair: &'a AgreementKeyPair,
    inputs: HandshakeInputs,
    state: ProtocolState,
}

impl<'a> KeyAgreementProtocol<'a> {
    pub fn new(
        notifier: Notifier,
        connection: KeyAgreementConnection,
        key_pair: &'a AgreementKeyPair,
        inputs: HandshakeInputs,
    ) -> Self {
        Self {
            notifier,
            transport: HandshakeTransport::new(connection),
            key_pair,
            inputs,
            state: ProtocolState::Start,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    fn alice(&self) -> bool {
        self.inputs.role.is_alice()
    }

    fn advance(&mut self, next: ProtocolState) {
        debug!(from = ?self.state, to = ?next, alice = self.alice(), "Handshake state");
        self.state = next;
    }

    /// Run the handshake to completion or abort.
    pub async fn perform(mut self) -> Result<KeyAgreementResult, KeyAgreementError> {
        match self.run().await {
            Ok(master_secret) => {
                let alice = self.alice();
                let connection = self.transport.into_connection();
                let transport = connection.transport().clone();
                info!(transport = %transport, alice, "Key agreement finished");
                Ok(KeyAgreementResult {
                    master_secret,
                    connection,
                    transport,
                    alice,
                })
            }
            Err(err) => {
                self.advance(ProtocolState::Aborted);
                match &err {
                    KeyAgreementError::Abort {
                        kind,
                        received: false,
                    } => {
                        warn!(kind = %kind, "Aborting key agreement");
                        self.transport.abort(true).await;
                    }
                    KeyAgreementError::Abort { received: true, .. } => {
                        info!("Peer aborted key agreement");
                        self.transport.into_connection().dispose(true, false).await;
                    }
                    other => {
                        warn!(error = %other, "Key agreement failed");
                        self.transport.into_connection().dispose(true, false).await;
                    }
                }
                Err(err)
            }
        }
    }

    async fn run(&mut self) -> Result<SecretKey, KeyAgreementError> {
        let their_key = if self.alice() {
            self.send_key().await?;
            // The peer may still be scanning our payload.
            self.notifier.waiting().await;
            self.receive_key().await?
        } else {
            let key = self.receive_key().await?;
            self.send_key().await?;
            key
        };

        let shared =
            derive_shared_secret(self.key_pair, &their_key, self.alice(), PROTOCOL_VERSION)
                .map_err(abort_on_bad_key)?;
        self.advance(ProtocolState::SharedSecretDerived);

        if self.alice() {
            self.send_confirm(&shared, &their_key).await?;
            self.receive_confirm(&shared, &their_key).await?;
        } else {
            self.receive_confirm(&shared, &their_key).await?;
            self.send_confirm(&shared, &their_key).await?;
        }

        let master = derive_master_secret(&shared)?;
        self.advance(ProtocolState::MasterDerived);
        Ok(master)
    }

    async fn send_key(&mut self) -> Result<(), KeyAgreementError> {
        let public = *self.key_pair.public().as_bytes();
        self.transport.send_key(&public).await?;
        self.advance(ProtocolState::KeySent);
        Ok(())
    }

    async fn receive_key(&mut self) -> Result<AgreementPublicKey, KeyAgreementError> {
        let bytes = self.transport.receive_key().await?;
        self.notifier.started().await;
        self.advance(ProtocolState::KeyReceived);

        let key = AgreementPublicKey::from_slice(&bytes)
            .map_err(|_| KeyAgreementError::abort(AbortKind::InvalidPublicKey))?;
        if !verify_commitment(&self.inputs.their_commitment, &key) {
            return Err(KeyAgreementError::abort(AbortKind::BadCommitment));
        }
        Ok(key)
    }

    fn confirmation(
        &self,
        shared: &SecretKey,
        their_key: &AgreementPublicKey,
        alice_record: bool,
    ) -> Result<[u8; 32], KeyAgreementError> {
        let inputs = ConfirmationInputs {
            our_payload: &self.inputs.our_payload,
            their_payload: &self.inputs.their_payload,
            our_public: self.key_pair.public(),
            their_public: their_key,
        };
        Ok(derive_confirmation_record(
            shared,
            &inputs,
            self.alice(),
            alice_record,
        )?)
    }

    async fn send_confirm(
        &mut self,
        shared: &SecretKey,
        their_key: &AgreementPublicKey,
    ) -> Result<(), KeyAgreementError> {
        let record = self.confirmation(shared, their_key, self.alice())?;
        self.transport.send_confirm(&record).await?;
        self.advance(ProtocolState::ConfirmSent);
        Ok(())
    }

    async fn receive_confirm(
        &mut self,
        shared: &SecretKey,
        their_key: &AgreementPublicKey,
    ) -> Result<(), KeyAgreementError> {
        let received = self.transport.receive_confirm().await?;
        let expected = self.confirmation(shared, their_key, !self.alice())?;
        if !verify_confirmation_record(&expected, &received) {
            return Err(KeyAgreementError::abort(AbortKind::BadConfirmation));
        }
        self.advance(ProtocolState::ConfirmReceived);
        Ok(())
    }
}

fn abort_on_bad_key(err: CryptoError) -> KeyAgreementError {
    match err {
        CryptoError::InvalidPublicKey => KeyAgreementError::abort(AbortKind::InvalidPublicKey),
        other => KeyAgreementError::Crypto(other),
    }
}
