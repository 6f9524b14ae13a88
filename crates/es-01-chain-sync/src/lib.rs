//! # es-01-chain-sync
//!
//! Chain Event Synchronizer: keeps the off-chain job mirror consistent with
//! the escrow contract's event log.
//!
//! ## Overview
//!
//! - **Backfill**: bounded batches from the last checkpoint to head
//! - **Live mode**: push subscription plus a reconciliation poll
//! - **Idempotency**: `(tx_hash, log_index)` is applied at most once
//! - **Continue-on-error**: a failed handler marks its event, the batch goes on
//! - **Circuit Breaker**: retry exhaustion halts until an operator restart
//!
//! ## Architecture
//!
//! ```text
//! ChainLogSource ──logs──→ Synchronizer ──EscrowEvent──→ EventHandlers
//!                               │                             │
//!                               ├── cursor / audit trail ──→ DurableStore
//!                               │                             ├── Job ──→ JobStore
//!                               │                             ├── notification ──→ JobEventSink
//!                               │                             └── DomainTransition ──→ TransitionListener
//! ```
//!
//! ## Batch Commit
//!
//! The cursor moves to the end of a batch only after every handler in the
//! batch has returned. A crash before that point rescans the batch on restart;
//! stored events are skipped and stored-but-unhandled events are dispatched.
//!
//! ## Example
//!
//! ```rust,ignore
//! use es_01_chain_sync::{ChainSyncApi, ChainSyncConfig, ChainSyncPorts, ChainSyncService};
//!
//! let sync = ChainSyncService::new(config, ports);
//! sync.initialize().await?;
//! sync.start().await?;
//! let status = sync.get_status().await;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::EventRepository;
pub use config::ChainSyncConfig;
pub use domain::{
    event_key, ChainEvent, ChainSyncError, ChainSyncResult, CircuitBreaker, CursorOrigin,
    EscrowEvent, SyncCursor, SyncEvent, SyncMetrics, SyncState, SyncStatus,
};
pub use handlers::EventHandlers;
pub use ports::{ChainLogSource, ChainSyncApi, MockChainLogSource, ParsedLog, RawLog, ReprocessReport};
pub use service::{ChainSyncPorts, ChainSyncService};
