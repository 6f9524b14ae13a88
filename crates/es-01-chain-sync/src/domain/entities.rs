//! # Domain Entities
//!
//! Audit-trail records and synchronizer state snapshots.

use serde::{Deserialize, Serialize};
use shared_types::{format_hash, Address, JobId, Timestamp, TxHash};

use super::circuit_breaker::SyncState;

/// One contract log as stored in the audit trail.
///
/// Identity is `(tx_hash, log_index)`. Created when the log is fetched,
/// marked processed once after handling, never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event_name: String,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u32,
    /// `None` when the log could not be decoded far enough to know the job.
    pub job_id: Option<JobId>,
    pub args: serde_json::Value,
    pub timestamp: Timestamp,
    pub processed: bool,
    pub processing_error: Option<String>,
}

impl ChainEvent {
    /// Storage key derived from the event identity.
    pub fn key(&self) -> String {
        event_key(&self.tx_hash, self.log_index)
    }

    /// Processed and the handler succeeded.
    pub fn is_applied(&self) -> bool {
        self.processed && self.processing_error.is_none()
    }

    /// Processed but the handler (or decoding) failed.
    pub fn is_failed(&self) -> bool {
        self.processed && self.processing_error.is_some()
    }
}

/// Key prefix of every audit-trail record.
pub const EVENT_PREFIX: &str = "event:";

/// Storage key for an event identity.
pub fn event_key(tx_hash: &TxHash, log_index: u32) -> String {
    format!("{}{}:{:06}", EVENT_PREFIX, format_hash(tx_hash), log_index)
}

/// Last fully committed block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_processed_block: u64,
    pub updated_at: Timestamp,
}

/// Where the cursor was loaded from during `initialize()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorOrigin {
    Cache,
    Durable,
    LatestEvent,
    HeadMinusMargin,
}

/// Snapshot returned by `get_status()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub initialized: bool,
    pub live_loop_running: bool,
    pub subscription_active: bool,
    pub network_id: u64,
    pub contract_address: Address,
    pub cursor: Option<u64>,
    pub cursor_origin: Option<CursorOrigin>,
    pub head: Option<u64>,
    pub blocks_behind: u64,
    pub last_synced_at: Option<Timestamp>,
    pub last_error: Option<String>,
}

/// Counters returned by `get_metrics()`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetrics {
    /// Events whose handler succeeded in this process.
    pub events_applied: u64,
    /// Events marked processed-with-error in this process.
    pub events_failed: u64,
    /// Logs skipped because they were already processed.
    pub events_skipped: u64,
    /// Logs delivered by the push subscription.
    pub live_events: u64,
    /// Batches whose cursor advance was committed.
    pub batches_committed: u64,
    /// Stored events still awaiting their handler.
    pub unprocessed_events: u64,
    /// Stored events carrying a processing error.
    pub errored_events: u64,
    pub blocks_behind: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(processed: bool, error: Option<&str>) -> ChainEvent {
        ChainEvent {
            event_name: "JobCancelled".into(),
            tx_hash: [0xAB; 32],
            block_number: 100,
            log_index: 3,
            job_id: Some(1),
            args: serde_json::json!({"job_id": 1}),
            timestamp: 0,
            processed,
            processing_error: error.map(String::from),
        }
    }

    #[test]
    fn test_event_key_is_identity() {
        let e = event(false, None);
        assert_eq!(e.key(), event_key(&[0xAB; 32], 3));
        assert!(e.key().starts_with("event:0xabab"));
        assert!(e.key().ends_with(":000003"));
    }

    #[test]
    fn test_applied_and_failed() {
        assert!(event(true, None).is_applied());
        assert!(!event(false, None).is_applied());
        assert!(event(true, Some("boom")).is_failed());
        assert!(!event(true, Some("boom")).is_applied());
    }
}
