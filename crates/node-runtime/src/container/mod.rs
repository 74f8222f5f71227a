//! # Subsystem Container
//!
//! Configuration and the single set of component instances the runtime
//! wires together.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, LoggingConfig, NodeConfig};
pub use subsystems::SubsystemContainer;
