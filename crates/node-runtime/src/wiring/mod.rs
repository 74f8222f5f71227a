//! # Wiring
//!
//! Long-running loops that connect components through the event bus.

pub mod event_routing;

pub use event_routing::KeyEventRouter;
