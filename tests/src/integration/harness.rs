//! Shared fixtures: one in-memory backend that survives runtime restarts.

use std::sync::Arc;

use es_01_chain_sync::MockChainLogSource;
use es_02_automation_rules::MockOracleVerifier;
use serde_json::{json, Value};
use settlement_runtime::{RuntimePorts, SettlementConfig, SettlementRuntime};
use shared_types::memory::{
    InMemoryDurableStore, InMemoryJobStore, ManualClock, MockSettlementGateway,
    RecordingEventSink,
};
use shared_types::{Address, JobId};

pub const CONTRACT: Address = [0xC0; 20];
pub const FREELANCER: Address = [0x22; 20];
pub const NETWORK_ID: u64 = 31_337;
pub const START: u64 = 1_700_000_000;

/// Everything outside the runtime. Dropping a runtime and building another
/// over the same backend simulates a process restart.
pub struct Backend {
    pub clock: Arc<ManualClock>,
    pub source: Arc<MockChainLogSource>,
    pub durable: Arc<InMemoryDurableStore>,
    pub jobs: Arc<InMemoryJobStore>,
    pub settlement: Arc<MockSettlementGateway>,
    pub oracle: Arc<MockOracleVerifier>,
    pub sink: Arc<RecordingEventSink>,
}

impl Backend {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(START));
        Self {
            durable: Arc::new(InMemoryDurableStore::new(clock.clone())),
            clock,
            source: Arc::new(MockChainLogSource::new(NETWORK_ID, CONTRACT, 0)),
            jobs: Arc::new(InMemoryJobStore::new()),
            settlement: Arc::new(MockSettlementGateway::with_balance(1_000_000)),
            oracle: Arc::new(MockOracleVerifier::new()),
            sink: Arc::new(RecordingEventSink::new()),
        }
    }

    /// A runtime over this backend. The cursor cache starts empty, as it
    /// would after a restart.
    pub fn runtime(&self, config: SettlementConfig) -> SettlementRuntime {
        SettlementRuntime::new(
            config,
            RuntimePorts {
                source: self.source.clone(),
                durable: self.durable.clone(),
                cache: Arc::new(InMemoryDurableStore::new(self.clock.clone())),
                jobs: self.jobs.clone(),
                settlement: self.settlement.clone(),
                oracle: self.oracle.clone(),
                sink: self.sink.clone(),
                clock: self.clock.clone(),
            },
        )
        .expect("valid test config")
    }

    /// Append a log at `block` and move the head there.
    pub fn emit(&self, name: &str, args: Value, block: u64) {
        let mut tx_hash = [0u8; 32];
        tx_hash[..8].copy_from_slice(&block.to_be_bytes());
        self.source.push_event(name, args, block, tx_hash, 0);
        self.source.set_head(block);
    }

    /// Created, accepted and funded with `[500, 300]`, in blocks 1 and 2.
    pub fn open_job(&self, job_id: JobId, client: Address) {
        self.emit(
            "JobCreated",
            json!({ "job_id": job_id, "client": client, "milestone_amounts": [500, 300] }),
            1,
        );
        self.emit(
            "JobAccepted",
            json!({ "job_id": job_id, "freelancer": FREELANCER }),
            2,
        );
    }

    pub fn count(&self, name: &str) -> usize {
        self.sink.names().iter().filter(|n| *n == name).count()
    }
}

pub fn config() -> SettlementConfig {
    SettlementConfig::for_testing(CONTRACT)
}
