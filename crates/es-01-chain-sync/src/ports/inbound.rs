//! Driving Ports (API - Inbound)
//!
//! Administrative and read surface of the Chain Event Synchronizer.

use async_trait::async_trait;
use shared_types::{JobId, TxHash};

use crate::domain::{ChainEvent, ChainSyncResult, SyncMetrics, SyncStatus};

/// Outcome of a `reprocess_failed` pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReprocessReport {
    /// Events whose handler succeeded this time.
    pub recovered: usize,
    /// Events that failed again.
    pub still_failing: usize,
}

/// Primary synchronizer API.
#[async_trait]
pub trait ChainSyncApi: Send + Sync {
    /// Validate config against the endpoint and load the cursor.
    async fn initialize(&self) -> ChainSyncResult<()>;

    /// Backfill to head, then run live mode until `stop()`.
    async fn start(&self) -> ChainSyncResult<()>;

    /// Stop the live loop. The committed cursor stays persisted.
    async fn stop(&self);

    /// Stop, clear a halt, re-initialize and start again.
    async fn restart(&self) -> ChainSyncResult<()>;

    /// Move the cursor so the next scan starts at `from_block`.
    async fn force_resync(&self, from_block: u64) -> ChainSyncResult<()>;

    /// Scan `[cursor + 1, head]` once.
    async fn sync_to_head(&self) -> ChainSyncResult<u64>;

    /// Re-dispatch events stored with a processing error.
    async fn reprocess_failed(&self, limit: usize) -> ChainSyncResult<ReprocessReport>;

    async fn get_status(&self) -> SyncStatus;

    async fn get_metrics(&self) -> ChainSyncResult<SyncMetrics>;

    /// Audit-trail lookup by identity.
    async fn event(&self, tx_hash: TxHash, log_index: u32) -> ChainSyncResult<ChainEvent>;

    /// Every stored event of a job, in chain order.
    async fn events_for_job(&self, job_id: JobId) -> ChainSyncResult<Vec<ChainEvent>>;
}
