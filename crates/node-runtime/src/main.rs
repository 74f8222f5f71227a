//! # Bramble Node Runtime
//!
//! Loads configuration, initialises logging, starts the runtime and runs
//! until Ctrl+C.
//!
//! Real transports are supplied by the host application. This binary wires
//! in-memory transports and runs a loopback self-test at startup: a second
//! in-process node pairs with this one, and a message is sent across the
//! resulting session.

mod self_test;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{LoggingConfig, NodeConfig, NodeRuntime};

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level {:?}", config.level))?,
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging)?;

    let network = br_01_key_agreement::adapters::MemoryNetwork::new();
    let runtime = NodeRuntime::new(config.clone(), self_test::plugins(&network, "local"))
        .context("Failed to build node runtime")?;
    runtime.start().await.context("Failed to start node runtime")?;

    self_test::run(&runtime, &network, &config)
        .await
        .context("Loopback self-test failed")?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
