//! # Session Flow
//!
//! ```text
//! KeyAgreementTask ×2 ──► master secret ──► KeyManager ×2
//!                                              │
//!        Alice: ConnectionContext ──► StreamWriter ──► tag ‖ frames
//!        Bob:   read_tag ──► ConnectionRecogniser ──► StreamReader
//! ```

use std::sync::Arc;

use br_01_key_agreement::adapters::{MemoryNetwork, MemoryPlugin};
use br_01_key_agreement::{ConnectorConfig, DuplexPlugin, KeyAgreementResult, KeyAgreementTask};
use br_02_transport_keys::{
    ConnectionRecogniser, FixedTimeSource, InMemorySecretStore, KeyManager, KeyManagerConfig,
};
use br_03_stream_crypto::{read_tag, FrameConfig, FrameError, StreamFactory};
use shared_bus::{BrambleEvent, InMemoryEventBus};
use shared_crypto::derive_initial_secret;
use shared_types::{ConnectionContext, ContactId, Endpoint, Tag, TransportId, TAG_LENGTH};

// =============================================================================
// FIXTURES
// =============================================================================

const NOW: u64 = 1_000_000_000;
/// With the test clock difference of 1s the rotation period is 3s.
const LATENCY: u64 = 1_000;
const ROTATION_PERIOD: u64 = 3_000;
const EPOCH: u64 = NOW - 10_000;
const CONTACT: ContactId = ContactId(1);
const UNLIMITED: u64 = u64::MAX;

fn lan() -> TransportId {
    TransportId::new("lan")
}

struct Peer {
    key_manager: Arc<KeyManager>,
    recogniser: Arc<ConnectionRecogniser>,
    store: Arc<InMemorySecretStore>,
}

impl Peer {
    async fn start(clock: &Arc<FixedTimeSource>) -> Self {
        let store = Arc::new(InMemorySecretStore::new());
        let recogniser = Arc::new(ConnectionRecogniser::new(store.clone()));
        let key_manager = Arc::new(
            KeyManager::new(
                KeyManagerConfig::for_testing(),
                store.clone(),
                recogniser.clone(),
                clock.clone(),
            )
            .unwrap(),
        );
        key_manager.set_transport_latency(&lan(), LATENCY).await.unwrap();
        key_manager.start().await.unwrap();
        Self {
            key_manager,
            recogniser,
            store,
        }
    }

    async fn add_contact(&self, result: &KeyAgreementResult) {
        let initial = derive_initial_secret(&result.master_secret, 0).unwrap();
        let endpoint = Endpoint::new(CONTACT, lan(), EPOCH, result.alice);
        self.key_manager.endpoint_added(endpoint, initial).await.unwrap();
    }

    async fn outgoing(&self) -> ConnectionContext {
        self.key_manager
            .get_connection_context(CONTACT, &lan())
            .await
            .unwrap()
            .expect("outgoing secret")
    }

    async fn recognise(&self, tag: &Tag) -> Option<ConnectionContext> {
        self.recogniser.accept_connection(&lan(), tag).await.unwrap()
    }
}

fn task(network: &Arc<MemoryNetwork>, bus: &Arc<InMemoryEventBus>, address: &str) -> KeyAgreementTask {
    let plugin: Arc<dyn DuplexPlugin> =
        Arc::new(MemoryPlugin::new(network.clone(), lan(), address, LATENCY));
    KeyAgreementTask::new(ConnectorConfig::for_testing(), vec![plugin], bus.clone()).unwrap()
}

/// Run a full key agreement and return (Alice's result, Bob's result).
async fn agree() -> (KeyAgreementResult, KeyAgreementResult) {
    let network = MemoryNetwork::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let first = task(&network, &bus, "first");
    let second = task(&network, &bus, "second");
    let first_payload = first.listen().await.unwrap();
    let second_payload = second.listen().await.unwrap();

    let (a, b) = tokio::join!(
        first.connect_and_run(&second_payload),
        second.connect_and_run(&first_payload)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    a.connection.dispose(false, true).await;
    b.connection.dispose(false, true).await;
    if a.alice {
        (a, b)
    } else {
        (b, a)
    }
}

/// Two started peers that share a clock and a contact.
async fn paired() -> (Peer, Peer, Arc<FixedTimeSource>) {
    let (alice_result, bob_result) = agree().await;
    assert!(alice_result.alice);
    assert!(!bob_result.alice);
    assert_eq!(alice_result.master_secret, bob_result.master_secret);

    let clock = Arc::new(FixedTimeSource::new(NOW));
    let alice = Peer::start(&clock).await;
    let bob = Peer::start(&clock).await;
    alice.add_contact(&alice_result).await;
    bob.add_contact(&bob_result).await;
    (alice, bob, clock)
}

fn factory() -> StreamFactory {
    StreamFactory::new(FrameConfig::for_testing()).unwrap()
}

async fn write_stream(ctx: &ConnectionContext, we_initiated: bool, message: &[u8]) -> Vec<u8> {
    let mut writer = factory()
        .create_writer(ctx, Vec::new(), we_initiated, UNLIMITED)
        .unwrap();
    writer.write(message).await.unwrap();
    writer.close().await.unwrap()
}

async fn read_stream(
    ctx: &ConnectionContext,
    we_initiated: bool,
    wire: &[u8],
) -> Result<Vec<u8>, FrameError> {
    factory().create_reader(ctx, wire, we_initiated)?.read_to_end().await
}

// =============================================================================
// END TO END
// =============================================================================

#[tokio::test]
async fn test_pairing_to_encrypted_session_both_directions() {
    let (alice, bob, _clock) = paired().await;

    let alice_ctx = alice.outgoing().await;
    let request = b"a message long enough to span several sixty-four byte frames on the wire";
    let wire = write_stream(&alice_ctx, true, request).await;

    let mut incoming = &wire[..];
    let tag = read_tag(&mut incoming).await.unwrap();
    let bob_ctx = bob
        .recognise(&tag)
        .await
        .unwrap_or_else(|| panic!("tag {} not recognised", hex::encode(tag)));
    assert_eq!(bob_ctx.contact, CONTACT);
    assert_eq!(bob_ctx.connection, alice_ctx.connection);
    assert!(!bob_ctx.alice);
    assert_eq!(read_stream(&bob_ctx, false, incoming).await.unwrap(), request);

    // The reply travels on the same connection without a tag.
    let reply = write_stream(&bob_ctx, false, b"reply").await;
    assert_eq!(read_stream(&alice_ctx, true, &reply).await.unwrap(), b"reply");
}

#[tokio::test]
async fn test_bob_can_initiate_too() {
    let (alice, bob, _clock) = paired().await;

    let bob_ctx = bob.outgoing().await;
    let wire = write_stream(&bob_ctx, true, b"from bob").await;
    let tag: Tag = wire[..TAG_LENGTH].try_into().unwrap();

    let alice_ctx = alice.recognise(&tag).await.expect("recognised");
    assert!(alice_ctx.alice);
    assert_eq!(
        read_stream(&alice_ctx, false, &wire[TAG_LENGTH..]).await.unwrap(),
        b"from bob"
    );
}

#[tokio::test]
async fn test_connection_numbers_advance() {
    let (alice, bob, _clock) = paired().await;

    let first = alice.outgoing().await;
    let second = alice.outgoing().await;
    assert_eq!(second.connection, first.connection + 1);

    // Tags may arrive out of order within the window.
    let second_wire = write_stream(&second, true, b"two").await;
    let first_wire = write_stream(&first, true, b"one").await;
    for wire in [second_wire, first_wire] {
        let tag: Tag = wire[..TAG_LENGTH].try_into().unwrap();
        assert!(bob.recognise(&tag).await.is_some());
    }
}

// =============================================================================
// ROTATION AND REMOVAL
// =============================================================================

#[tokio::test]
async fn test_rotation_keeps_session_recognisable() {
    let (alice, bob, clock) = paired().await;
    let (_, _, outgoing_before) = alice.key_manager.periods(CONTACT, &lan());
    let outgoing_before = outgoing_before.expect("outgoing period");

    // Opened before rotation, arriving after it.
    let in_flight = write_stream(&alice.outgoing().await, true, b"late").await;

    clock.advance(ROTATION_PERIOD);
    alice.key_manager.rotate_keys().await.unwrap();
    bob.key_manager.rotate_keys().await.unwrap();

    let (older, newer, outgoing_after) = alice.key_manager.periods(CONTACT, &lan());
    assert_eq!(outgoing_after, Some(outgoing_before + 1));
    assert_eq!(older, Some(outgoing_before));
    assert_eq!(newer, Some(outgoing_before + 1));

    let tag: Tag = in_flight[..TAG_LENGTH].try_into().unwrap();
    let ctx = bob.recognise(&tag).await.expect("in-flight tag recognised");
    assert_eq!(
        read_stream(&ctx, false, &in_flight[TAG_LENGTH..]).await.unwrap(),
        b"late"
    );

    let fresh = write_stream(&alice.outgoing().await, true, b"fresh").await;
    let tag: Tag = fresh[..TAG_LENGTH].try_into().unwrap();
    assert!(bob.recognise(&tag).await.is_some());
}

#[tokio::test]
async fn test_removed_contact_is_not_recognised() {
    let (alice, bob, _clock) = paired().await;
    let wire = write_stream(&alice.outgoing().await, true, b"hello").await;
    let tag: Tag = wire[..TAG_LENGTH].try_into().unwrap();

    bob.key_manager
        .handle_event(&BrambleEvent::ContactRemoved { contact: CONTACT })
        .await
        .unwrap();
    assert!(bob.recognise(&tag).await.is_none());
    assert_eq!(bob.store.secret_count(), 0);
    assert_eq!(bob.recogniser.tag_count(), 0);
}

// =============================================================================
// ATTACKS
// =============================================================================

#[tokio::test]
async fn test_replayed_tag_is_rejected() {
    let (alice, bob, _clock) = paired().await;
    let wire = write_stream(&alice.outgoing().await, true, b"once").await;
    let tag: Tag = wire[..TAG_LENGTH].try_into().unwrap();

    assert!(bob.recognise(&tag).await.is_some());
    assert!(bob.recognise(&tag).await.is_none());
}

#[tokio::test]
async fn test_tampered_frame_fails_authentication() {
    let (alice, bob, _clock) = paired().await;
    let mut wire = write_stream(&alice.outgoing().await, true, b"do not touch").await;
    let tag: Tag = wire[..TAG_LENGTH].try_into().unwrap();
    let ctx = bob.recognise(&tag).await.expect("recognised");

    wire[TAG_LENGTH + 1] ^= 0x80;
    assert!(matches!(
        read_stream(&ctx, false, &wire[TAG_LENGTH..]).await,
        Err(FrameError::BadMac)
    ));
}

#[tokio::test]
async fn test_unrelated_peer_cannot_read_session() {
    let (alice, _bob, _clock) = paired().await;
    let (_, outsider, _clock) = paired().await;

    let wire = write_stream(&alice.outgoing().await, true, b"private").await;
    let tag: Tag = wire[..TAG_LENGTH].try_into().unwrap();
    assert!(outsider.recognise(&tag).await.is_none());

    alice.key_manager.stop().await;
    outsider.key_manager.stop().await;
}
