//! Publishes one task's progress on the event bus.

use shared_bus::{BrambleEvent, EventPublisher};
use shared_types::{Payload, TransportId};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct Notifier {
    task: Uuid,
    publisher: Arc<dyn EventPublisher>,
}

impl Notifier {
    pub fn new(task: Uuid, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { task, publisher }
    }

    pub fn task(&self) -> Uuid {
        self.task
    }

    async fn publish(&self, event: BrambleEvent) {
        let receivers = self.publisher.publish(event).await;
        debug!(task = %self.task, receivers, "Key agreement event");
    }

    pub async fn listening(&self, payload: Payload) {
        self.publish(BrambleEvent::KeyAgreementListening {
            task: self.task,
            payload,
        })
        .await;
    }

    pub async fn waiting(&self) {
        self.publish(BrambleEvent::KeyAgreementWaiting { task: self.task })
            .await;
    }

    pub async fn started(&self) {
        self.publish(BrambleEvent::KeyAgreementStarted { task: self.task })
            .await;
    }

    pub async fn finished(&self, transport: TransportId, alice: bool) {
        self.publish(BrambleEvent::KeyAgreementFinished {
            task: self.task,
            transport,
            alice,
        })
        .await;
    }

    pub async fn aborted(&self, remote: bool) {
        self.publish(BrambleEvent::KeyAgreementAborted {
            task: self.task,
            remote,
        })
        .await;
    }

    pub async fn failed(&self) {
        self.publish(BrambleEvent::KeyAgreementFailed { task: self.task })
            .await;
    }
}
