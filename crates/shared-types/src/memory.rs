//! # In-Memory Adapters
//!
//! Port implementations for unit tests and single-process embedding.
//! Production deployments back these ports with a real database, chain
//! client and notification pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::entities::{Address, Amount, DomainTransition, Job, JobId, Timestamp, TxHash};
use crate::errors::{GatewayError, StoreError};
use crate::ports::{
    DurableStore, JobEventSink, JobStore, SettlementGateway, TimeSource, TransitionListener,
};

// =============================================================================
// CLOCKS
// =============================================================================

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_secs(), Ordering::SeqCst);
    }

    pub fn set(&self, to: Timestamp) {
        self.now.store(to, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// STORES
// =============================================================================

/// In-memory durable store with TTL, ordered by key.
pub struct InMemoryDurableStore {
    data: RwLock<BTreeMap<String, (Vec<u8>, Option<Timestamp>)>>,
    clock: Arc<dyn TimeSource>,
}

impl InMemoryDurableStore {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.data
            .read()
            .values()
            .filter(|(_, expiry)| expiry.map_or(true, |e| e > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now();
        Ok(self.data.read().get(key).and_then(|(value, expiry)| {
            match expiry {
                Some(e) if *e <= now => None,
                _ => Some(value.clone()),
            }
        }))
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expiry = ttl.map(|t| self.clock.now() + t.as_secs());
        self.data.write().insert(key.to_string(), (value, expiry));
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, (_, expiry))| expiry.map_or(true, |e| e > now))
            .map(|(k, (v, _))| (k.clone(), v.clone()))
            .collect())
    }
}

/// In-memory job table.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let store = Self::new();
        store
            .jobs
            .write()
            .extend(jobs.into_iter().map(|j| (j.id, j)));
        store
    }

    /// Apply a mutation directly (test setup).
    pub fn update<F: FnOnce(&mut Job)>(&self, job_id: JobId, f: F) -> bool {
        match self.jobs.write().get_mut(&job_id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, job_id: JobId) -> Option<Job> {
        self.jobs.read().get(&job_id).cloned()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().get(&job_id).cloned())
    }

    async fn save_job(&self, job: Job) -> Result<(), StoreError> {
        self.jobs.write().insert(job.id, job);
        Ok(())
    }
}

// =============================================================================
// SINKS & LISTENERS
// =============================================================================

/// Discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl JobEventSink for NoopEventSink {
    fn on_job_event(&self, _job_id: JobId, _name: &str, _payload: serde_json::Value) {}
}

/// Records notifications for assertions.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(JobId, String, serde_json::Value)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(JobId, String, serde_json::Value)> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(_, n, _)| n.clone()).collect()
    }
}

impl JobEventSink for RecordingEventSink {
    fn on_job_event(&self, job_id: JobId, name: &str, payload: serde_json::Value) {
        self.events.lock().push((job_id, name.to_string(), payload));
    }
}

/// Records transitions for assertions.
#[derive(Debug, Default)]
pub struct RecordingTransitionListener {
    transitions: Mutex<Vec<DomainTransition>>,
}

impl RecordingTransitionListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<DomainTransition> {
        self.transitions.lock().clone()
    }
}

#[async_trait]
impl TransitionListener for RecordingTransitionListener {
    async fn on_transition(&self, transition: DomainTransition) {
        self.transitions.lock().push(transition);
    }
}

// =============================================================================
// SETTLEMENT
// =============================================================================

/// A release accepted by the mock gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub job_id: JobId,
    pub to: Address,
    pub amount: Amount,
    pub tx_hash: TxHash,
}

/// Settlement gateway that tracks a single contract balance.
#[derive(Debug, Default)]
pub struct MockSettlementGateway {
    balance: Mutex<Amount>,
    releases: Mutex<Vec<ReleaseRecord>>,
    transient_failures: Mutex<u32>,
    reject_all: Mutex<bool>,
}

impl MockSettlementGateway {
    pub fn with_balance(balance: Amount) -> Self {
        Self {
            balance: Mutex::new(balance),
            ..Default::default()
        }
    }

    /// Fail the next `n` calls with a transport error.
    pub fn fail_next(&self, n: u32) {
        *self.transient_failures.lock() = n;
    }

    /// Reject every release, like a contract refusing an already-settled milestone.
    pub fn reject_all(&self, reject: bool) {
        *self.reject_all.lock() = reject;
    }

    pub fn releases(&self) -> Vec<ReleaseRecord> {
        self.releases.lock().clone()
    }

    pub fn balance(&self) -> Amount {
        *self.balance.lock()
    }
}

#[async_trait]
impl SettlementGateway for MockSettlementGateway {
    async fn release_funds(
        &self,
        job_id: JobId,
        to: Address,
        amount: Amount,
    ) -> Result<TxHash, GatewayError> {
        {
            let mut failures = self.transient_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(GatewayError::Transport("connection reset".into()));
            }
        }
        if *self.reject_all.lock() {
            return Err(GatewayError::Rejected("milestone already settled".into()));
        }

        let mut balance = self.balance.lock();
        if *balance < amount {
            return Err(GatewayError::Rejected("insufficient escrow balance".into()));
        }
        *balance -= amount;

        let mut releases = self.releases.lock();
        let mut tx_hash = [0xEEu8; 32];
        tx_hash[..8].copy_from_slice(&(releases.len() as u64 + 1).to_be_bytes());
        releases.push(ReleaseRecord {
            job_id,
            to,
            amount,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn check_sufficient_balance(
        &self,
        _address: Address,
        amount: Amount,
    ) -> Result<bool, GatewayError> {
        Ok(*self.balance.lock() >= amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_durable_store_ttl_expiry() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = InMemoryDurableStore::new(clock.clone());

        store
            .put("cursor:cache", b"110".to_vec(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store.put("cursor:durable", b"110".to_vec(), None).await.unwrap();
        assert!(store.get("cursor:cache").await.unwrap().is_some());

        clock.advance(Duration::from_secs(61));
        assert!(store.get("cursor:cache").await.unwrap().is_none());
        assert!(store.get("cursor:durable").await.unwrap().is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_scan_is_ordered_and_bounded() {
        let store = InMemoryDurableStore::default();
        store.put("rule:b", b"2".to_vec(), None).await.unwrap();
        store.put("rule:a", b"1".to_vec(), None).await.unwrap();
        store.put("ruleset", b"x".to_vec(), None).await.unwrap();
        store.put("proposal:a", b"3".to_vec(), None).await.unwrap();

        let rules = store.scan_prefix("rule:").await.unwrap();
        let keys: Vec<_> = rules.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["rule:a", "rule:b"]);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = InMemoryDurableStore::default();
        crate::ports::save_json(&store, "job:1", &vec![1u32, 2, 3], None)
            .await
            .unwrap();
        let loaded: Option<Vec<u32>> = crate::ports::load_json(&store, "job:1").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        store.put("job:2", b"not json".to_vec(), None).await.unwrap();
        let corrupt: Result<Option<Vec<u32>>, _> = crate::ports::load_json(&store, "job:2").await;
        assert!(matches!(corrupt, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_mock_gateway_balance_and_failures() {
        let gateway = MockSettlementGateway::with_balance(1_000);
        assert!(gateway.check_sufficient_balance([0u8; 20], 1_000).await.unwrap());

        gateway.fail_next(1);
        assert!(matches!(
            gateway.release_funds(1, [2u8; 20], 400).await,
            Err(GatewayError::Transport(_))
        ));
        let tx = gateway.release_funds(1, [2u8; 20], 400).await.unwrap();
        assert_eq!(gateway.balance(), 600);
        assert_eq!(gateway.releases()[0].tx_hash, tx);

        assert!(matches!(
            gateway.release_funds(1, [2u8; 20], 700).await,
            Err(GatewayError::Rejected(_))
        ));
    }
}
