//! # Domain Layer
//!
//! Pure synchronizer domain: audit-trail records, the closed escrow event
//! union, the circuit breaker and errors.

pub mod circuit_breaker;
pub mod entities;
pub mod errors;
pub mod events;

pub use circuit_breaker::{CircuitBreaker, SyncEvent, SyncState};
pub use entities::{
    event_key, ChainEvent, CursorOrigin, SyncCursor, SyncMetrics, SyncStatus, EVENT_PREFIX,
};
pub use errors::{ChainSyncError, ChainSyncResult};
pub use events::EscrowEvent;
