//! # Synchronizer Metrics
//!
//! Prometheus metrics for the Chain Event Synchronizer.
//!
//! Enable with the `metrics` feature:
//! ```toml
//! es-01-chain-sync = { path = "...", features = ["metrics"] }
//! ```
//!
//! - `chain_sync_events_applied_total` - Counter of events whose handler succeeded
//! - `chain_sync_events_failed_total` - Counter of events stored with an error (by event)
//! - `chain_sync_batches_committed_total` - Counter of committed cursor advances
//! - `chain_sync_cursor_block` - Gauge of the last committed block
//! - `chain_sync_blocks_behind` - Gauge of head minus cursor
//! - `chain_sync_state` - Gauge of breaker state (0=Running, 1=Retrying, 2=Halted)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, Gauge, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref EVENTS_APPLIED: IntCounter = register_int_counter!(
        "chain_sync_events_applied_total",
        "Total events whose handler succeeded"
    )
    .expect("Failed to create EVENTS_APPLIED metric");

    pub static ref EVENTS_FAILED: IntCounterVec = register_int_counter_vec!(
        "chain_sync_events_failed_total",
        "Total events stored with a processing error",
        &["event"]
    )
    .expect("Failed to create EVENTS_FAILED metric");

    pub static ref BATCHES_COMMITTED: IntCounter = register_int_counter!(
        "chain_sync_batches_committed_total",
        "Total batches whose cursor advance was committed"
    )
    .expect("Failed to create BATCHES_COMMITTED metric");

    pub static ref CURSOR_BLOCK: Gauge = register_gauge!(
        "chain_sync_cursor_block",
        "Last committed block"
    )
    .expect("Failed to create CURSOR_BLOCK metric");

    pub static ref BLOCKS_BEHIND: Gauge = register_gauge!(
        "chain_sync_blocks_behind",
        "Head minus committed cursor"
    )
    .expect("Failed to create BLOCKS_BEHIND metric");

    pub static ref SYNC_STATE: Gauge = register_gauge!(
        "chain_sync_state",
        "Synchronizer state (0=Running, 1=Retrying, 2=Halted)"
    )
    .expect("Failed to create SYNC_STATE metric");
}

#[cfg(feature = "metrics")]
pub fn record_event_applied() {
    EVENTS_APPLIED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_event_failed(event: &str) {
    EVENTS_FAILED.with_label_values(&[event]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_batch_committed(cursor: u64) {
    BATCHES_COMMITTED.inc();
    CURSOR_BLOCK.set(cursor as f64);
}

#[cfg(feature = "metrics")]
pub fn set_blocks_behind(blocks: u64) {
    BLOCKS_BEHIND.set(blocks as f64);
}

#[cfg(feature = "metrics")]
pub fn set_sync_state(state: u8) {
    SYNC_STATE.set(state as f64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_event_applied() {}

#[cfg(not(feature = "metrics"))]
pub fn record_event_failed(_event: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_batch_committed(_cursor: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn set_blocks_behind(_blocks: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn set_sync_state(_state: u8) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_callable() {
        record_event_applied();
        record_event_failed("JobCreated");
        record_batch_committed(100);
        set_blocks_behind(3);
        set_sync_state(0);
    }
}
