//! Event and cursor persistence over the shared `DurableStore` port.
//!
//! The durable store is the source of truth. The cursor is mirrored into a
//! cache store with a TTL for fast restarts.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{
    format_address, load_json, save_json, scan_json, Address, DurableStore, JobId, StoreError,
    Timestamp, TxHash,
};
use tracing::warn;

use crate::domain::{event_key, ChainEvent, SyncCursor, EVENT_PREFIX};

/// Audit trail and cursor persistence for one contract.
pub struct EventRepository {
    durable: Arc<dyn DurableStore>,
    cache: Arc<dyn DurableStore>,
    cursor_key: String,
    cache_ttl: Duration,
}

impl EventRepository {
    pub fn new(
        durable: Arc<dyn DurableStore>,
        cache: Arc<dyn DurableStore>,
        contract: Address,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            durable,
            cache,
            cursor_key: format!("cursor:{}", format_address(&contract)),
            cache_ttl,
        }
    }

    /// Cursor from the cache mirror. Cache failures read as a miss.
    pub async fn load_cached_cursor(&self) -> Option<SyncCursor> {
        match load_json(self.cache.as_ref(), &self.cursor_key).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!("[es-01] Cursor cache unreadable, falling back: {}", e);
                None
            }
        }
    }

    pub async fn load_durable_cursor(&self) -> Result<Option<SyncCursor>, StoreError> {
        load_json(self.durable.as_ref(), &self.cursor_key).await
    }

    /// Advance the cursor to `block` unless it already is at or past it.
    ///
    /// Returns the committed cursor.
    pub async fn advance_cursor(&self, block: u64, now: Timestamp) -> Result<u64, StoreError> {
        if let Some(current) = self.load_durable_cursor().await? {
            if current.last_processed_block >= block {
                return Ok(current.last_processed_block);
            }
        }
        self.write_cursor(block, now).await?;
        Ok(block)
    }

    /// Set the cursor unconditionally. Only used by forced resync and
    /// initial checkpointing.
    pub async fn force_cursor(&self, block: u64, now: Timestamp) -> Result<(), StoreError> {
        self.write_cursor(block, now).await
    }

    async fn write_cursor(&self, block: u64, now: Timestamp) -> Result<(), StoreError> {
        let cursor = SyncCursor {
            last_processed_block: block,
            updated_at: now,
        };
        save_json(self.durable.as_ref(), &self.cursor_key, &cursor, None).await?;
        if let Err(e) = save_json(
            self.cache.as_ref(),
            &self.cursor_key,
            &cursor,
            Some(self.cache_ttl),
        )
        .await
        {
            warn!("[es-01] Cursor cache write failed: {}", e);
        }
        Ok(())
    }

    pub async fn get_event(
        &self,
        tx_hash: &TxHash,
        log_index: u32,
    ) -> Result<Option<ChainEvent>, StoreError> {
        load_json(self.durable.as_ref(), &event_key(tx_hash, log_index)).await
    }

    pub async fn put_event(&self, event: &ChainEvent) -> Result<(), StoreError> {
        save_json(self.durable.as_ref(), &event.key(), event, None).await
    }

    /// Every stored event in chain order.
    pub async fn all_events(&self) -> Result<Vec<ChainEvent>, StoreError> {
        let mut events: Vec<ChainEvent> = scan_json(self.durable.as_ref(), EVENT_PREFIX).await?;
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    /// Block of the most recent stored event.
    pub async fn latest_event_block(&self) -> Result<Option<u64>, StoreError> {
        Ok(self
            .all_events()
            .await?
            .iter()
            .map(|e| e.block_number)
            .max())
    }

    pub async fn events_for_job(&self, job_id: JobId) -> Result<Vec<ChainEvent>, StoreError> {
        Ok(self
            .all_events()
            .await?
            .into_iter()
            .filter(|e| e.job_id == Some(job_id))
            .collect())
    }

    /// Events stored with a processing error, in chain order.
    pub async fn failed_events(&self) -> Result<Vec<ChainEvent>, StoreError> {
        Ok(self
            .all_events()
            .await?
            .into_iter()
            .filter(ChainEvent::is_failed)
            .collect())
    }

    /// `(unprocessed, errored)` counts.
    pub async fn backlog_counts(&self) -> Result<(u64, u64), StoreError> {
        let events = self.all_events().await?;
        let unprocessed = events.iter().filter(|e| !e.processed).count() as u64;
        let errored = events.iter().filter(|e| e.is_failed()).count() as u64;
        Ok((unprocessed, errored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::memory::{InMemoryDurableStore, ManualClock};

    fn repo() -> (EventRepository, Arc<InMemoryDurableStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let durable = Arc::new(InMemoryDurableStore::new(clock.clone()));
        let cache = Arc::new(InMemoryDurableStore::new(clock.clone()));
        let repo = EventRepository::new(
            durable,
            cache.clone(),
            [0xC0; 20],
            Duration::from_secs(60),
        );
        (repo, cache, clock)
    }

    fn event(block: u64, log_index: u32, job_id: JobId) -> ChainEvent {
        ChainEvent {
            event_name: "JobCancelled".into(),
            tx_hash: [block as u8; 32],
            block_number: block,
            log_index,
            job_id: Some(job_id),
            args: serde_json::json!({"job_id": job_id}),
            timestamp: 0,
            processed: false,
            processing_error: None,
        }
    }

    #[tokio::test]
    async fn test_cursor_is_monotonic() {
        let (repo, _, _) = repo();
        assert_eq!(repo.advance_cursor(110, 1).await.unwrap(), 110);
        assert_eq!(repo.advance_cursor(105, 2).await.unwrap(), 110);
        assert_eq!(
            repo.load_durable_cursor().await.unwrap().unwrap().last_processed_block,
            110
        );

        repo.force_cursor(50, 3).await.unwrap();
        assert_eq!(
            repo.load_durable_cursor().await.unwrap().unwrap().last_processed_block,
            50
        );
    }

    #[tokio::test]
    async fn test_cache_mirror_expires() {
        let (repo, _, clock) = repo();
        repo.advance_cursor(10, 1).await.unwrap();
        assert_eq!(repo.load_cached_cursor().await.unwrap().last_processed_block, 10);

        clock.advance(Duration::from_secs(61));
        assert!(repo.load_cached_cursor().await.is_none());
        assert!(repo.load_durable_cursor().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_events_in_chain_order() {
        let (repo, _, _) = repo();
        repo.put_event(&event(120, 0, 2)).await.unwrap();
        repo.put_event(&event(100, 1, 1)).await.unwrap();
        repo.put_event(&event(100, 0, 1)).await.unwrap();

        let all = repo.all_events().await.unwrap();
        let order: Vec<(u64, u32)> = all.iter().map(|e| (e.block_number, e.log_index)).collect();
        assert_eq!(order, vec![(100, 0), (100, 1), (120, 0)]);
        assert_eq!(repo.latest_event_block().await.unwrap(), Some(120));
        assert_eq!(repo.events_for_job(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_backlog_counts() {
        let (repo, _, _) = repo();
        let mut failed = event(100, 0, 1);
        failed.processed = true;
        failed.processing_error = Some("boom".into());
        repo.put_event(&failed).await.unwrap();
        repo.put_event(&event(101, 0, 1)).await.unwrap();

        assert_eq!(repo.backlog_counts().await.unwrap(), (1, 1));
        assert_eq!(repo.failed_events().await.unwrap().len(), 1);
    }
}
