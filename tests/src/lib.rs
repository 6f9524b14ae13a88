//! # Escrow Settlement Test Suite
//!
//! Cross-subsystem flows run against the composed runtime with in-memory
//! adapters.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs      # Runtime wired to mocks, chain event helpers
//!     ├── release_flow.rs # Chain events → rule → settlement
//!     ├── multisig_flow.rs# Rule → proposal → signatures → execution
//!     └── recovery.rs     # Restart from durable state
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p es-tests
//! cargo test -p es-tests integration::multisig_flow::
//! ```

pub mod integration;
