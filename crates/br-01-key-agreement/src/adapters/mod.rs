//! Adapters layer.

pub mod memory_plugin;

pub use memory_plugin::{
    Disposal, MemoryConnection, MemoryDisposals, MemoryListener, MemoryNetwork, MemoryPlugin,
};
