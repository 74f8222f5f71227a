//! # Key-Agreement Task
//!
//! Owns the ephemeral key pair for one pairing attempt and drives it from
//! listening to a master secret, publishing progress on the event bus:
//!
//! | Outcome | Event |
//! |---------|-------|
//! | listening | `KeyAgreementListening { payload }` |
//! | handshake completed | `KeyAgreementFinished { transport, alice }` |
//! | abort detected locally | `KeyAgreementAborted { remote: false }` |
//! | abort record from peer | `KeyAgreementAborted { remote: true }` |
//! | no connection, I/O failure | `KeyAgreementFailed` |
//!
//! The master secret is only returned to the caller.

use crate::config::ConnectorConfig;
use crate::connector::KeyAgreementConnector;
use crate::domain::{KeyAgreementError, Role};
use crate::notifier::Notifier;
use crate::ports::DuplexPlugin;
use crate::protocol::{HandshakeInputs, KeyAgreementProtocol, KeyAgreementResult};
use parking_lot::Mutex;
use shared_bus::EventPublisher;
use shared_crypto::AgreementKeyPair;
use shared_types::Payload;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct KeyAgreementTask {
    id: Uuid,
    key_pair: AgreementKeyPair,
    connector: KeyAgreementConnector,
    notifier: Notifier,
    payload: Mutex<Option<Payload>>,
}

impl KeyAgreementTask {
    pub fn new(
        config: ConnectorConfig,
        plugins: Vec<Arc<dyn DuplexPlugin>>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, KeyAgreementError> {
        let id = Uuid::new_v4();
        let notifier = Notifier::new(id, publisher);
        let connector = KeyAgreementConnector::new(config, plugins, notifier.clone())?;
        Ok(Self {
            id,
            key_pair: AgreementKeyPair::generate(),
            connector,
            notifier,
            payload: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Our payload, once listening.
    pub fn payload(&self) -> Option<Payload> {
        self.payload.lock().clone()
    }

    /// Start listening and publish the payload to show the peer.
    pub async fn listen(&self) -> Result<Payload, KeyAgreementError> {
        let payload = self.connector.listen(&self.key_pair).await?;
        *self.payload.lock() = Some(payload.clone());
        info!(task = %self.id, "Key agreement listening");
        self.notifier.listening(payload.clone()).await;
        Ok(payload)
    }

    /// Connect to the peer that showed `remote` and run the handshake.
    pub async fn connect_and_run(
        &self,
        remote: &Payload,
    ) -> Result<KeyAgreementResult, KeyAgreementError> {
        let outcome = self.try_connect_and_run(remote).await;
        match &outcome {
            Ok(result) => {
                self.notifier
                    .finished(result.transport.clone(), result.alice)
                    .await
            }
            Err(e) if e.is_abort() => self.notifier.aborted(e.is_received_abort()).await,
            Err(_) => self.notifier.failed().await,
        }
        outcome
    }

    async fn try_connect_and_run(
        &self,
        remote: &Payload,
    ) -> Result<KeyAgreementResult, KeyAgreementError> {
        let ours = self.payload().ok_or(KeyAgreementError::NotListening)?;
        let Some(role) = Role::assign(&ours, remote) else {
            self.connector.stop().await;
            return Err(KeyAgreementError::OwnPayload);
        };
        let inputs = match HandshakeInputs::new(&ours, remote, role) {
            Ok(inputs) => inputs,
            Err(e) => {
                self.connector.stop().await;
                return Err(e.into());
            }
        };

        let connection = self
            .connector
            .connect(remote, role)
            .await?
            .ok_or(KeyAgreementError::NoConnection)?;

        KeyAgreementProtocol::new(self.notifier.clone(), connection, &self.key_pair, inputs)
            .perform()
            .await
    }

    /// Abandon the task: stop listening and close every candidate.
    pub async fn stop(&self) {
        info!(task = %self.id, "Key agreement stopped");
        self.connector.stop().await;
    }
}

#[cfg(test)]
mod tests;
