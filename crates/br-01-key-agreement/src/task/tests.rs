use super::*;
use crate::adapters::{MemoryNetwork, MemoryPlugin};
use shared_bus::{BrambleEvent, EventFilter, InMemoryEventBus, Subscription};
use shared_types::{Commitment, TransportDescriptor, TransportId};
use std::time::Duration;

// =============================================================================
// FIXTURES
// =============================================================================

fn lan() -> TransportId {
    TransportId::new("lan")
}

fn task(network: &Arc<MemoryNetwork>, bus: &Arc<InMemoryEventBus>, address: &str) -> Arc<KeyAgreementTask> {
    let plugin: Arc<dyn DuplexPlugin> =
        Arc::new(MemoryPlugin::new(network.clone(), lan(), address, 1_000));
    Arc::new(KeyAgreementTask::new(ConnectorConfig::for_testing(), vec![plugin], bus.clone()).unwrap())
}

fn drain(events: &mut Subscription) -> Vec<BrambleEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = events.try_recv() {
        seen.push(event);
    }
    seen
}

// =============================================================================
// FULL RUN
// =============================================================================

#[tokio::test]
async fn test_two_tasks_agree_on_master_secret() {
    let network = MemoryNetwork::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let first = task(&network, &bus, "first");
    let second = task(&network, &bus, "second");
    let mut first_events = bus.subscribe(EventFilter::for_task(first.id()));
    let mut second_events = bus.subscribe(EventFilter::for_task(second.id()));

    let first_payload = first.listen().await.unwrap();
    let second_payload = second.listen().await.unwrap();
    assert_eq!(first.payload(), Some(first_payload.clone()));

    // Each side has scanned the other's payload.
    let (a, b) = tokio::join!(
        first.connect_and_run(&second_payload),
        second.connect_and_run(&first_payload)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.master_secret, b.master_secret);
    assert_ne!(a.alice, b.alice);
    assert_eq!(
        a.alice,
        Role::assign(&first_payload, &second_payload) == Some(Role::Alice)
    );
    assert_eq!(a.transport, lan());

    let first_seen = drain(&mut first_events);
    assert_eq!(
        first_seen.first(),
        Some(&BrambleEvent::KeyAgreementListening {
            task: first.id(),
            payload: first_payload,
        })
    );
    assert_eq!(
        first_seen.last(),
        Some(&BrambleEvent::KeyAgreementFinished {
            task: first.id(),
            transport: lan(),
            alice: a.alice,
        })
    );
    assert!(first_seen
        .iter()
        .any(|e| matches!(e, BrambleEvent::KeyAgreementStarted { .. })));
    assert!(matches!(
        drain(&mut second_events).last(),
        Some(BrambleEvent::KeyAgreementFinished { .. })
    ));

    a.connection.dispose(false, true).await;
    b.connection.dispose(false, true).await;
    // Nothing is left listening.
    assert!(!network.is_bound(&lan(), b"first"));
    assert!(!network.is_bound(&lan(), b"second"));
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn test_connect_before_listen_fails() {
    let network = MemoryNetwork::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let first = task(&network, &bus, "first");
    let mut events = bus.subscribe(EventFilter::for_task(first.id()));
    let remote = Payload::new(Commitment([1; 16]), vec![]);

    let err = first.connect_and_run(&remote).await.unwrap_err();
    assert!(matches!(err, KeyAgreementError::NotListening));
    assert_eq!(
        drain(&mut events),
        vec![BrambleEvent::KeyAgreementFailed { task: first.id() }]
    );
}

#[tokio::test]
async fn test_own_payload_rejected() {
    let network = MemoryNetwork::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let first = task(&network, &bus, "first");
    let ours = first.listen().await.unwrap();

    let err = first.connect_and_run(&ours).await.unwrap_err();
    assert!(matches!(err, KeyAgreementError::OwnPayload));
    assert!(!network.is_bound(&lan(), b"first"));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_peer_is_no_connection() {
    let network = MemoryNetwork::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let first = task(&network, &bus, "first");
    let mut events = bus.subscribe(EventFilter::for_task(first.id()));
    first.listen().await.unwrap();
    let remote = Payload::new(
        Commitment([0xff; 16]),
        vec![TransportDescriptor::new(lan(), b"gone".to_vec())],
    );

    let err = first.connect_and_run(&remote).await.unwrap_err();
    assert!(matches!(err, KeyAgreementError::NoConnection));
    assert_eq!(
        drain(&mut events).last(),
        Some(&BrambleEvent::KeyAgreementFailed { task: first.id() })
    );
}

#[tokio::test]
async fn test_stop_cancels_running_task() {
    let network = MemoryNetwork::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let first = task(&network, &bus, "first");
    first.listen().await.unwrap();
    let remote = Payload::new(
        Commitment([0xff; 16]),
        vec![TransportDescriptor::new(lan(), b"gone".to_vec())],
    );

    let running = {
        let first = first.clone();
        tokio::spawn(async move { first.connect_and_run(&remote).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    first.stop().await;

    let result = tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("task should stop promptly")
        .unwrap();
    assert!(matches!(result, Err(KeyAgreementError::Stopped)));
}
