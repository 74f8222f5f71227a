//! Loopback self-test: pair with an in-process peer over in-memory
//! transports and exchange one message on the new session.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use br_01_key_agreement::adapters::{MemoryNetwork, MemoryPlugin};
use br_01_key_agreement::DuplexPlugin;
use br_02_transport_keys::{RotationSchedule, SystemTimeSource, TimeSource};
use br_03_stream_crypto::read_tag;
use shared_types::{ContactId, TransportId};

use node_runtime::{NodeConfig, NodeRuntime};

const LAN_LATENCY_MS: u64 = 30_000;
const BLUETOOTH_LATENCY_MS: u64 = 30_000;
const PIPE_BUFFER: usize = 64 * 1024;
const PEER_CONTACT: ContactId = ContactId(1);
const GREETING: &[u8] = b"hello from the loopback peer";

pub fn plugins(network: &Arc<MemoryNetwork>, address: &str) -> Vec<Arc<dyn DuplexPlugin>> {
    vec![
        Arc::new(MemoryPlugin::new(
            network.clone(),
            TransportId::new("lan"),
            address,
            LAN_LATENCY_MS,
        )),
        Arc::new(MemoryPlugin::new(
            network.clone(),
            TransportId::new("bluetooth"),
            address,
            BLUETOOTH_LATENCY_MS,
        )),
    ]
}

pub async fn run(local: &NodeRuntime, network: &Arc<MemoryNetwork>, config: &NodeConfig) -> Result<()> {
    info!("Running loopback self-test");
    let peer = NodeRuntime::new(config.clone(), plugins(network, "peer"))?;
    peer.start().await?;
    let outcome = exchange(local, &peer, config).await;
    peer.shutdown().await;
    outcome
}

async fn exchange(local: &NodeRuntime, peer: &NodeRuntime, config: &NodeConfig) -> Result<()> {
    let local_task = local.new_key_agreement_task()?;
    let peer_task = peer.new_key_agreement_task()?;
    let local_payload = local_task.listen().await?;
    let peer_payload = peer_task.listen().await?;

    let (ours, theirs) = tokio::join!(
        local_task.connect_and_run(&peer_payload),
        peer_task.connect_and_run(&local_payload)
    );
    let (ours, theirs) = (ours?, theirs?);
    info!(transport = %ours.transport, alice = ours.alice, "Loopback key agreement finished");

    // Backdate the epoch by one rotation period so the previous period
    // exists on both sides.
    let container = local.container();
    let latency = container
        .plugins
        .iter()
        .map(|p| container.transport_latency(p.as_ref()))
        .max()
        .unwrap_or_default();
    let schedule = RotationSchedule::new(config.key_manager.max_clock_difference_ms, latency)?;
    let epoch = SystemTimeSource
        .now()
        .saturating_sub(schedule.rotation_period());

    local
        .add_contact_from_agreement(PEER_CONTACT, &ours, epoch)
        .await?;
    peer.add_contact_from_agreement(PEER_CONTACT, &theirs, epoch)
        .await?;
    ours.connection.dispose(false, true).await;
    theirs.connection.dispose(false, true).await;

    let lan = TransportId::new("lan");
    let ctx = local
        .connection_context(PEER_CONTACT, &lan)
        .await?
        .context("No outgoing secret for the loopback peer")?;

    let (outgoing, mut incoming) = tokio::io::duplex(PIPE_BUFFER);
    let mut writer = local
        .stream_factory()
        .create_writer(&ctx, outgoing, true, u64::MAX)?;
    writer.write(GREETING).await?;
    writer.close().await?;

    let tag = read_tag(&mut incoming).await?;
    let peer_ctx = peer
        .recognise(&lan, &tag)
        .await
        .context("Peer did not recognise the tag")?;
    let mut reader = peer
        .stream_factory()
        .create_reader(&peer_ctx, incoming, false)?;
    let received = reader.read_to_end().await?;
    if received != GREETING {
        bail!("Loopback message corrupted");
    }

    info!(
        contact = %peer_ctx.contact,
        connection = peer_ctx.connection,
        bytes = received.len(),
        "Loopback self-test passed"
    );
    Ok(())
}
