//! # Bramble Test Suite
//!
//! Cross-crate flows that no single subsystem can test on its own.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks for the crypto hot paths
//! └── src/integration/  # Key agreement through to encrypted streams
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p br-tests
//! cargo bench -p br-tests
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod integration;
