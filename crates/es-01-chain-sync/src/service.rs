//! Chain Event Synchronizer service
//!
//! One logical sequence per contract: every scan and every live push log runs
//! under the batch lock, so backfill, reconciliation polling and push
//! delivery never interleave against the same cursor.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use shared_types::{
    format_address, retry_with_backoff, Classified, DurableStore, JobEventSink, JobId,
    JobStore, TimeSource, TransitionListener, TxHash,
};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::EventRepository;
use crate::config::ChainSyncConfig;
use crate::domain::{
    ChainEvent, ChainSyncError, ChainSyncResult, CircuitBreaker, CursorOrigin, EscrowEvent,
    SyncEvent, SyncMetrics, SyncState, SyncStatus,
};
use crate::handlers::EventHandlers;
use crate::metrics;
use crate::ports::{ChainLogSource, ChainSyncApi, RawLog, ReprocessReport};

/// Collaborators the synchronizer is wired with.
pub struct ChainSyncPorts {
    pub source: Arc<dyn ChainLogSource>,
    /// Source of truth for cursor and audit trail.
    pub durable: Arc<dyn DurableStore>,
    /// Fast cursor mirror.
    pub cache: Arc<dyn DurableStore>,
    pub jobs: Arc<dyn JobStore>,
    pub listener: Arc<dyn TransitionListener>,
    pub sink: Arc<dyn JobEventSink>,
    pub clock: Arc<dyn TimeSource>,
}

/// Mutable state, never held across an await.
#[derive(Default)]
struct SyncInnerState {
    breaker: CircuitBreaker,
    initialized: bool,
    cursor: Option<u64>,
    cursor_origin: Option<CursorOrigin>,
    head: Option<u64>,
    subscription_active: bool,
    last_synced_at: Option<u64>,
    last_error: Option<String>,
}

#[derive(Default)]
struct Counters {
    applied: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    live: AtomicU64,
    batches: AtomicU64,
}

/// Result of preparing one fetched log.
enum Prepared {
    /// Already processed.
    Skip,
    /// Stored as processed-with-error, nothing to dispatch.
    Rejected,
    /// Stored and awaiting its handler.
    Dispatch(ChainEvent, EscrowEvent),
}

/// Ownership of the live loop. `Starting` reserves it across the backfill.
#[derive(Default)]
enum LiveSlot {
    #[default]
    Idle,
    Starting,
    Running(JoinHandle<()>),
}

struct SyncInner {
    config: ChainSyncConfig,
    source: Arc<dyn ChainLogSource>,
    repository: EventRepository,
    handlers: EventHandlers,
    clock: Arc<dyn TimeSource>,
    state: RwLock<SyncInnerState>,
    counters: Counters,
    batch_lock: AsyncMutex<()>,
    shutdown: watch::Sender<bool>,
    live_task: Mutex<LiveSlot>,
    live_running: AtomicBool,
}

/// Chain Event Synchronizer.
///
/// Cheap to clone; clones share the same loop and state.
#[derive(Clone)]
pub struct ChainSyncService {
    inner: Arc<SyncInner>,
}

impl ChainSyncService {
    pub fn new(config: ChainSyncConfig, ports: ChainSyncPorts) -> Self {
        let repository = EventRepository::new(
            ports.durable,
            ports.cache,
            config.contract_address,
            config.cursor_cache_ttl(),
        );
        let handlers = EventHandlers::new(ports.jobs, ports.listener, ports.sink);
        let (shutdown, _) = watch::channel(false);
        let state = SyncInnerState {
            breaker: CircuitBreaker::new(config.max_sync_attempts),
            ..Default::default()
        };

        Self {
            inner: Arc::new(SyncInner {
                config,
                source: ports.source,
                repository,
                handlers,
                clock: ports.clock,
                state: RwLock::new(state),
                counters: Counters::default(),
                batch_lock: AsyncMutex::new(()),
                shutdown,
                live_task: Mutex::new(LiveSlot::Idle),
                live_running: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ChainSyncConfig {
        &self.inner.config
    }

    /// Current breaker state.
    pub fn state(&self) -> SyncState {
        self.inner.state.read().breaker.state()
    }
}

#[async_trait]
impl ChainSyncApi for ChainSyncService {
    async fn initialize(&self) -> ChainSyncResult<()> {
        let result = self.inner.initialize().await;
        if let Err(err) = &result {
            error!("[es-01] Initialization failed: {}", err);
            self.inner.state.write().last_error = Some(err.to_string());
        }
        result
    }

    async fn start(&self) -> ChainSyncResult<()> {
        let inner = &self.inner;
        {
            let state = inner.state.read();
            if !state.initialized {
                return Err(ChainSyncError::NotInitialized);
            }
            if state.breaker.is_halted() {
                return Err(ChainSyncError::Halted(
                    state.last_error.clone().unwrap_or_default(),
                ));
            }
        }
        {
            let mut slot = inner.live_task.lock();
            let busy = match &*slot {
                LiveSlot::Idle => false,
                LiveSlot::Starting => true,
                LiveSlot::Running(handle) => !handle.is_finished(),
            };
            if busy {
                return Err(ChainSyncError::AlreadyRunning);
            }
            *slot = LiveSlot::Starting;
        }

        inner.shutdown.send_replace(false);
        let mut shutdown = inner.shutdown.subscribe();
        let backfill = tokio::select! {
            result = inner.supervised_sync() => result,
            _ = stop_requested(&mut shutdown) => Err(ChainSyncError::Stopped),
        };
        let cursor = match backfill {
            Ok(cursor) => cursor,
            Err(err) => {
                let mut slot = inner.live_task.lock();
                if matches!(*slot, LiveSlot::Starting) {
                    *slot = LiveSlot::Idle;
                }
                return Err(err);
            }
        };
        info!(cursor, "[es-01] Backfill complete, entering live mode");

        inner.live_running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(Arc::clone(inner).run_live(shutdown));
        *inner.live_task.lock() = LiveSlot::Running(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.inner.shutdown.send_replace(true);
        let slot = std::mem::take(&mut *self.inner.live_task.lock());
        if let LiveSlot::Running(handle) = slot {
            if let Err(e) = handle.await {
                warn!("[es-01] Live loop ended abnormally: {}", e);
            }
        }
        self.inner.live_running.store(false, Ordering::SeqCst);
        self.inner.state.write().subscription_active = false;
        info!("[es-01] Synchronizer stopped");
    }

    async fn restart(&self) -> ChainSyncResult<()> {
        self.stop().await;
        {
            let mut state = self.inner.state.write();
            state.breaker.process_event(SyncEvent::ManualRestart);
            state.initialized = false;
            state.last_error = None;
        }
        metrics::set_sync_state(0);
        info!("[es-01] Manual restart");
        self.initialize().await?;
        self.start().await
    }

    async fn force_resync(&self, from_block: u64) -> ChainSyncResult<()> {
        let _batch = self.inner.batch_lock.lock().await;
        if !self.inner.state.read().initialized {
            return Err(ChainSyncError::NotInitialized);
        }
        let cursor = from_block.saturating_sub(1);
        self.inner
            .repository
            .force_cursor(cursor, self.inner.clock.now())
            .await?;
        self.inner.state.write().cursor = Some(cursor);
        warn!(from_block, "[es-01] Forced resync, cursor reset to {}", cursor);
        Ok(())
    }

    async fn sync_to_head(&self) -> ChainSyncResult<u64> {
        self.inner.supervised_sync().await
    }

    async fn reprocess_failed(&self, limit: usize) -> ChainSyncResult<ReprocessReport> {
        self.inner.reprocess_failed(limit).await
    }

    async fn get_status(&self) -> SyncStatus {
        let state = self.inner.state.read();
        let blocks_behind = match (state.head, state.cursor) {
            (Some(head), Some(cursor)) => head.saturating_sub(cursor),
            _ => 0,
        };
        SyncStatus {
            state: state.breaker.state(),
            initialized: state.initialized,
            live_loop_running: self.inner.live_running.load(Ordering::SeqCst),
            subscription_active: state.subscription_active,
            network_id: self.inner.config.network_id,
            contract_address: self.inner.config.contract_address,
            cursor: state.cursor,
            cursor_origin: state.cursor_origin,
            head: state.head,
            blocks_behind,
            last_synced_at: state.last_synced_at,
            last_error: state.last_error.clone(),
        }
    }

    async fn get_metrics(&self) -> ChainSyncResult<SyncMetrics> {
        let (unprocessed_events, errored_events) =
            self.inner.repository.backlog_counts().await?;
        let blocks_behind = self.get_status().await.blocks_behind;
        let c = &self.inner.counters;
        Ok(SyncMetrics {
            events_applied: c.applied.load(Ordering::Relaxed),
            events_failed: c.failed.load(Ordering::Relaxed),
            events_skipped: c.skipped.load(Ordering::Relaxed),
            live_events: c.live.load(Ordering::Relaxed),
            batches_committed: c.batches.load(Ordering::Relaxed),
            unprocessed_events,
            errored_events,
            blocks_behind,
        })
    }

    async fn event(&self, tx_hash: TxHash, log_index: u32) -> ChainSyncResult<ChainEvent> {
        self.inner
            .repository
            .get_event(&tx_hash, log_index)
            .await?
            .ok_or(ChainSyncError::EventNotFound {
                tx: tx_hash,
                log_index,
            })
    }

    async fn events_for_job(&self, job_id: JobId) -> ChainSyncResult<Vec<ChainEvent>> {
        Ok(self.inner.repository.events_for_job(job_id).await?)
    }
}

impl SyncInner {
    async fn initialize(&self) -> ChainSyncResult<()> {
        self.config.validate()?;
        let policy = &self.config.retry;
        let contract = self.config.contract_address;

        let network = retry_with_backoff(policy, "network_id", || self.source.network_id()).await?;
        if network != self.config.network_id {
            return Err(ChainSyncError::NetworkMismatch {
                expected: self.config.network_id,
                actual: network,
            });
        }
        let deployed = retry_with_backoff(policy, "has_contract_code", || {
            self.source.has_contract_code(contract)
        })
        .await?;
        if !deployed {
            return Err(ChainSyncError::ContractNotFound(format_address(&contract)));
        }

        let now = self.clock.now();
        let cached = self.repository.load_cached_cursor().await;
        let durable = self.repository.load_durable_cursor().await?;
        // The cache only short-cuts a cursor the durable store agrees with.
        let trusted = cached.filter(|c| durable.map_or(true, |d| d == *c));
        let (cursor, origin) = if let Some(c) = trusted {
            (c.last_processed_block, CursorOrigin::Cache)
        } else if let Some(d) = durable {
            if let Some(c) = cached {
                warn!(
                    cached = c.last_processed_block,
                    durable = d.last_processed_block,
                    "[es-01] Cursor cache disagrees with durable store, using durable"
                );
            }
            (d.last_processed_block, CursorOrigin::Durable)
        } else if let Some(block) = self.repository.latest_event_block().await? {
            let cursor = block.saturating_sub(1);
            self.repository.force_cursor(cursor, now).await?;
            (cursor, CursorOrigin::LatestEvent)
        } else {
            let head =
                retry_with_backoff(policy, "get_block_number", || self.source.get_block_number())
                    .await?;
            let cursor = head.saturating_sub(self.config.safety_margin_blocks);
            self.repository.force_cursor(cursor, now).await?;
            (cursor, CursorOrigin::HeadMinusMargin)
        };

        {
            let mut state = self.state.write();
            state.initialized = true;
            state.cursor = Some(cursor);
            state.cursor_origin = Some(origin);
        }
        info!(
            network_id = network,
            contract = %format_address(&contract),
            cursor,
            origin = ?origin,
            "[es-01] Synchronizer initialized"
        );
        Ok(())
    }

    /// Sync to head under the circuit breaker, with backoff between attempts.
    async fn supervised_sync(&self) -> ChainSyncResult<u64> {
        let mut backoff = self.config.retry.backoff();
        loop {
            {
                let state = self.state.read();
                if state.breaker.is_halted() {
                    return Err(ChainSyncError::Halted(
                        state.last_error.clone().unwrap_or_default(),
                    ));
                }
            }

            let err = match self.sync_once().await {
                Ok(cursor) => {
                    let mut state = self.state.write();
                    state.breaker.process_event(SyncEvent::SyncCommitted);
                    state.last_error = None;
                    metrics::set_sync_state(0);
                    return Ok(cursor);
                }
                Err(err) => err,
            };

            if matches!(err, ChainSyncError::NotInitialized) {
                return Err(err);
            }
            if !err.class().is_retryable() {
                self.halt(SyncEvent::FatalError, &err);
                return Err(ChainSyncError::Halted(err.to_string()));
            }

            let new_state = {
                let mut state = self.state.write();
                state.last_error = Some(err.to_string());
                state.breaker.process_event(SyncEvent::SyncFailed)
            };
            if new_state == SyncState::Halted {
                self.halt(SyncEvent::SyncFailed, &err);
                return Err(ChainSyncError::Halted(err.to_string()));
            }
            metrics::set_sync_state(1);

            let delay = backoff
                .next_delay()
                .unwrap_or_else(|| Duration::from_millis(self.config.retry.max_backoff_ms));
            warn!(
                state = ?new_state,
                delay_ms = delay.as_millis() as u64,
                "[es-01] Sync attempt failed: {}",
                err
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn halt(&self, cause: SyncEvent, err: &ChainSyncError) {
        {
            let mut state = self.state.write();
            if !state.breaker.is_halted() {
                state.breaker.process_event(cause);
            }
            state.last_error = Some(err.to_string());
        }
        metrics::set_sync_state(2);
        error!(
            alert = "critical",
            class = ?err.class(),
            "[es-01] Synchronizer halted, operator restart required: {}",
            err
        );
    }

    /// Process `[cursor + 1, head]` in batches.
    async fn sync_once(&self) -> ChainSyncResult<u64> {
        let _batch = self.batch_lock.lock().await;
        let mut cursor = self
            .state
            .read()
            .cursor
            .ok_or(ChainSyncError::NotInitialized)?;

        let head = retry_with_backoff(&self.config.retry, "get_block_number", || {
            self.source.get_block_number()
        })
        .await?;
        self.state.write().head = Some(head);

        while cursor < head {
            let from = cursor + 1;
            let to = cursor.saturating_add(self.config.batch_size).min(head);
            self.process_range(from, to).await?;
            cursor = self.repository.advance_cursor(to, self.clock.now()).await?;
            self.state.write().cursor = Some(cursor);
            self.counters.batches.fetch_add(1, Ordering::Relaxed);
            metrics::record_batch_committed(cursor);
            info!(from, to, "[es-01] Batch committed");
        }

        self.state.write().last_synced_at = Some(self.clock.now());
        metrics::set_blocks_behind(head.saturating_sub(cursor));
        Ok(cursor)
    }

    /// Fetch, persist and dispatch every log in `[from, to]`.
    ///
    /// Returns once every handler has returned. Handler failures are recorded
    /// on their event; only store or provider failures fail the batch.
    async fn process_range(&self, from: u64, to: u64) -> ChainSyncResult<()> {
        let contract = self.config.contract_address;
        let mut logs = retry_with_backoff(&self.config.retry, "get_logs", || {
            self.source.get_logs(contract, from, to)
        })
        .await?;
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        debug!(from, to, logs = logs.len(), "[es-01] Fetched logs");

        let mut by_job: BTreeMap<JobId, Vec<(ChainEvent, EscrowEvent)>> = BTreeMap::new();
        for raw in &logs {
            if let Prepared::Dispatch(record, event) = self.prepare(raw).await? {
                by_job
                    .entry(event.job_id())
                    .or_default()
                    .push((record, event));
            }
        }

        let results: Vec<ChainSyncResult<()>> = stream::iter(by_job.into_values())
            .map(|events| async move {
                for (record, event) in events {
                    self.dispatch(record, &event).await?;
                }
                Ok::<(), ChainSyncError>(())
            })
            .buffer_unordered(self.config.handler_concurrency)
            .collect()
            .await;
        results.into_iter().collect()
    }

    /// Dedupe and persist one raw log.
    async fn prepare(&self, raw: &RawLog) -> ChainSyncResult<Prepared> {
        if let Some(existing) = self
            .repository
            .get_event(&raw.tx_hash, raw.log_index)
            .await?
        {
            if existing.processed {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(Prepared::Skip);
            }
            // Stored before a crash, handler never ran.
            return match EscrowEvent::decode(&existing.event_name, &existing.args) {
                Ok(event) => Ok(Prepared::Dispatch(existing, event)),
                Err(err) => self.reject(existing, err).await,
            };
        }

        let timestamp = raw.block_timestamp.unwrap_or_else(|| self.clock.now());
        let mut record = ChainEvent {
            event_name: String::new(),
            tx_hash: raw.tx_hash,
            block_number: raw.block_number,
            log_index: raw.log_index,
            job_id: None,
            args: serde_json::Value::Null,
            timestamp,
            processed: false,
            processing_error: None,
        };

        let parsed = match self.source.parse_log(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                record.event_name = "unparseable".into();
                return self.reject(record, err).await;
            }
        };
        record.event_name = parsed.name;
        record.job_id = parsed.args.get("job_id").and_then(|v| v.as_u64());
        record.args = parsed.args;

        match EscrowEvent::decode(&record.event_name, &record.args) {
            Ok(event) => {
                record.job_id = Some(event.job_id());
                self.repository.put_event(&record).await?;
                Ok(Prepared::Dispatch(record, event))
            }
            Err(err) => self.reject(record, err).await,
        }
    }

    async fn reject(&self, mut record: ChainEvent, err: ChainSyncError) -> ChainSyncResult<Prepared> {
        warn!(
            block = record.block_number,
            log_index = record.log_index,
            "[es-01] Storing undecodable event {}: {}",
            record.event_name,
            err
        );
        record.processed = true;
        record.processing_error = Some(err.to_string());
        self.repository.put_event(&record).await?;
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_failed(&record.event_name);
        Ok(Prepared::Rejected)
    }

    /// Run the handler and mark the event processed, with or without error.
    async fn dispatch(&self, mut record: ChainEvent, event: &EscrowEvent) -> ChainSyncResult<bool> {
        let outcome = self
            .handlers
            .apply(event, &record.key(), record.timestamp)
            .await;
        record.processed = true;
        let applied = match outcome {
            Ok(_) => {
                record.processing_error = None;
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_applied();
                true
            }
            Err(err) => {
                warn!(
                    job_id = event.job_id(),
                    block = record.block_number,
                    class = ?err.class(),
                    "[es-01] Handler for {} failed: {}",
                    event.name(),
                    err
                );
                record.processing_error = Some(err.to_string());
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_failed(event.name());
                false
            }
        };
        self.repository.put_event(&record).await?;
        Ok(applied)
    }

    /// Apply one push-delivered log. Never moves the cursor.
    async fn apply_live(&self, raw: RawLog) -> ChainSyncResult<()> {
        let _batch = self.batch_lock.lock().await;
        self.counters.live.fetch_add(1, Ordering::Relaxed);
        if let Prepared::Dispatch(record, event) = self.prepare(&raw).await? {
            self.dispatch(record, &event).await?;
        }
        Ok(())
    }

    async fn reprocess_failed(&self, limit: usize) -> ChainSyncResult<ReprocessReport> {
        let _batch = self.batch_lock.lock().await;
        let mut report = ReprocessReport::default();
        for record in self.repository.failed_events().await?.into_iter().take(limit) {
            let event = match EscrowEvent::decode(&record.event_name, &record.args) {
                Ok(event) => event,
                Err(_) => {
                    report.still_failing += 1;
                    continue;
                }
            };
            if self.dispatch(record, &event).await? {
                report.recovered += 1;
            } else {
                report.still_failing += 1;
            }
        }
        info!(
            recovered = report.recovered,
            still_failing = report.still_failing,
            "[es-01] Reprocessed failed events"
        );
        Ok(report)
    }

    async fn open_subscription(&self) -> Option<mpsc::Receiver<RawLog>> {
        match self.source.subscribe(self.config.contract_address).await {
            Ok(rx) => {
                self.state.write().subscription_active = true;
                debug!("[es-01] Subscription open");
                Some(rx)
            }
            Err(err) => {
                self.state.write().subscription_active = false;
                warn!("[es-01] Subscription failed, relying on polling: {}", err);
                None
            }
        }
    }

    /// Push subscription plus reconciliation poll until shutdown or halt.
    async fn run_live(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut subscription = self.open_subscription().await;
        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        poll.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                log = next_log(&mut subscription) => match log {
                    Some(raw) => {
                        if let Err(err) = self.apply_live(raw).await {
                            warn!("[es-01] Live log not applied, poll will retry: {}", err);
                        }
                    }
                    None => {
                        warn!("[es-01] Subscription closed");
                        subscription = None;
                        self.state.write().subscription_active = false;
                    }
                },
                _ = poll.tick() => {
                    if subscription.is_none() {
                        subscription = self.open_subscription().await;
                    }
                    // Dropping the sync on shutdown cancels its backoff sleeps;
                    // events it stored but did not mark are re-dispatched later.
                    let result = tokio::select! {
                        result = self.supervised_sync() => result,
                        _ = stop_requested(&mut shutdown) => break,
                    };
                    if let Err(err) = result {
                        if matches!(err, ChainSyncError::Halted(_)) {
                            break;
                        }
                        warn!("[es-01] Reconciliation poll failed: {}", err);
                    }
                }
            }
        }

        self.live_running.store(false, Ordering::SeqCst);
        self.state.write().subscription_active = false;
        debug!("[es-01] Live loop exited");
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn next_log(subscription: &mut Option<mpsc::Receiver<RawLog>>) -> Option<RawLog> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
