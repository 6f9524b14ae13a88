//! # Shared Types Crate
//!
//! Domain primitives, outbound ports and infrastructure helpers used by every
//! settlement subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: jobs, milestones and trigger kinds are defined
//!   once here and consumed by the synchronizer, rule engine and quorum manager.
//! - **Ports, not technologies**: persistence, settlement and notification are
//!   traits; the in-memory adapters in [`memory`] exist for tests and embedding.
//! - **One error taxonomy**: every subsystem error classifies itself into an
//!   [`ErrorClass`] so retry decisions are made in one place.

pub mod amount;
pub mod entities;
pub mod errors;
pub mod locks;
pub mod memory;
pub mod ports;
pub mod retry;

pub use entities::*;
pub use errors::*;
pub use locks::KeyedLocks;
pub use ports::*;
pub use retry::{retry_with_backoff, Backoff, CallTimeout, RetryPolicy};
