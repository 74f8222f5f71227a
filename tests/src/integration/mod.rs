//! Integration flows.
//!
//! - `session_flow` - two peers pair over in-memory transports, seed their
//!   key managers from the agreed master secret and exchange frames.

#[cfg(test)]
mod session_flow;
