//! # Outbound Ports
//!
//! The chain-log source the synchronizer pulls from.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use shared_types::{format_hash, Address, Hash, Timestamp, TxHash};
use tokio::sync::mpsc;

use crate::domain::ChainSyncError;

/// Raw contract log as returned by the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u32,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
    /// Block timestamp, when the provider includes it.
    pub block_timestamp: Option<Timestamp>,
}

/// ABI-decoded log.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedLog {
    pub name: String,
    pub args: serde_json::Value,
}

/// Chain-log source - outbound port.
#[async_trait]
pub trait ChainLogSource: Send + Sync {
    /// Network id reported by the endpoint.
    async fn network_id(&self) -> Result<u64, ChainSyncError>;

    /// Whether contract code is deployed at `address`.
    async fn has_contract_code(&self, address: Address) -> Result<bool, ChainSyncError>;

    /// Current head block.
    async fn get_block_number(&self) -> Result<u64, ChainSyncError>;

    /// Logs emitted by `address` in the inclusive range `[from, to]`.
    async fn get_logs(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, ChainSyncError>;

    /// Push subscription for new logs of `address`. Best effort: the channel
    /// may miss logs or close at any time.
    async fn subscribe(&self, address: Address) -> Result<mpsc::Receiver<RawLog>, ChainSyncError>;

    /// Decode a raw log into `{name, args}`.
    fn parse_log(&self, raw: &RawLog) -> Result<ParsedLog, ChainSyncError>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Mock log source. Log payloads are JSON `{"name": .., "args": ..}`.
pub struct MockChainLogSource {
    network_id: u64,
    contract: Address,
    head: AtomicU64,
    logs: RwLock<Vec<RawLog>>,
    subscriber: Mutex<Option<mpsc::Sender<RawLog>>>,
    transient_failures: AtomicU32,
    always_fail: AtomicBool,
    get_logs_calls: AtomicU64,
}

impl MockChainLogSource {
    pub fn new(network_id: u64, contract: Address, head: u64) -> Self {
        Self {
            network_id,
            contract,
            head: AtomicU64::new(head),
            logs: RwLock::new(Vec::new()),
            subscriber: Mutex::new(None),
            transient_failures: AtomicU32::new(0),
            always_fail: AtomicBool::new(false),
            get_logs_calls: AtomicU64::new(0),
        }
    }

    /// Build a raw log carrying a mock-encoded event.
    pub fn encode_log(
        contract: Address,
        name: &str,
        args: serde_json::Value,
        block_number: u64,
        tx_hash: TxHash,
        log_index: u32,
    ) -> RawLog {
        let payload = serde_json::json!({ "name": name, "args": args });
        RawLog {
            address: contract,
            tx_hash,
            block_number,
            log_index,
            topics: Vec::new(),
            data: payload.to_string().into_bytes(),
            block_timestamp: Some(1_700_000_000 + block_number * 12),
        }
    }

    /// Add a log to history without pushing it to subscribers.
    pub fn add_log(&self, log: RawLog) {
        self.logs.write().push(log);
    }

    /// Add a log and deliver it through the subscription, if any.
    pub fn emit_log(&self, log: RawLog) {
        self.add_log(log.clone());
        if let Some(tx) = self.subscriber.lock().as_ref() {
            let _ = tx.try_send(log);
        }
    }

    /// Convenience: encode and add.
    pub fn push_event(
        &self,
        name: &str,
        args: serde_json::Value,
        block_number: u64,
        tx_hash: TxHash,
        log_index: u32,
    ) {
        self.add_log(Self::encode_log(
            self.contract,
            name,
            args,
            block_number,
            tx_hash,
            log_index,
        ));
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Fail the next `n` RPC calls with a provider error.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every RPC call until cleared.
    pub fn fail_always(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Drop the push channel, as a flaky websocket would.
    pub fn close_subscription(&self) {
        self.subscriber.lock().take();
    }

    pub fn get_logs_calls(&self) -> u64 {
        self.get_logs_calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> Result<(), ChainSyncError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(ChainSyncError::Provider("Mock provider down".into()));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ChainSyncError::Provider("Mock failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainLogSource for MockChainLogSource {
    async fn network_id(&self) -> Result<u64, ChainSyncError> {
        self.maybe_fail()?;
        Ok(self.network_id)
    }

    async fn has_contract_code(&self, address: Address) -> Result<bool, ChainSyncError> {
        self.maybe_fail()?;
        Ok(address == self.contract)
    }

    async fn get_block_number(&self) -> Result<u64, ChainSyncError> {
        self.maybe_fail()?;
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, ChainSyncError> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|l| l.address == address && l.block_number >= from && l.block_number <= to)
            .cloned()
            .collect())
    }

    async fn subscribe(&self, address: Address) -> Result<mpsc::Receiver<RawLog>, ChainSyncError> {
        if address != self.contract {
            return Err(ChainSyncError::ContractNotFound(format!("{:?}", address)));
        }
        let (tx, rx) = mpsc::channel(256);
        *self.subscriber.lock() = Some(tx);
        Ok(rx)
    }

    fn parse_log(&self, raw: &RawLog) -> Result<ParsedLog, ChainSyncError> {
        let unparseable = |reason: String| ChainSyncError::UnparseableLog {
            tx: format_hash(&raw.tx_hash),
            log_index: raw.log_index,
            reason,
        };
        let value: serde_json::Value =
            serde_json::from_slice(&raw.data).map_err(|e| unparseable(e.to_string()))?;
        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| unparseable("missing event name".into()))?
            .to_string();
        let args = value.get("args").cloned().unwrap_or(serde_json::Value::Null);
        Ok(ParsedLog { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: Address = [0xC0; 20];

    #[tokio::test]
    async fn test_mock_get_logs_range_is_inclusive() {
        let source = MockChainLogSource::new(1, CONTRACT, 200);
        source.push_event("JobCancelled", serde_json::json!({"job_id": 1}), 100, [1; 32], 0);
        source.push_event("JobCancelled", serde_json::json!({"job_id": 2}), 110, [2; 32], 0);
        source.push_event("JobCancelled", serde_json::json!({"job_id": 3}), 111, [3; 32], 0);

        let logs = source.get_logs(CONTRACT, 100, 110).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_parse_log() {
        let source = MockChainLogSource::new(1, CONTRACT, 200);
        let raw = MockChainLogSource::encode_log(
            CONTRACT,
            "JobAccepted",
            serde_json::json!({"job_id": 5}),
            10,
            [9; 32],
            1,
        );
        let parsed = source.parse_log(&raw).unwrap();
        assert_eq!(parsed.name, "JobAccepted");
        assert_eq!(parsed.args["job_id"], 5);

        let garbage = RawLog {
            data: b"\x00\x01".to_vec(),
            ..raw
        };
        assert!(matches!(
            source.parse_log(&garbage),
            Err(ChainSyncError::UnparseableLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let source = MockChainLogSource::new(1, CONTRACT, 200);
        source.fail_next(1);
        assert!(source.get_block_number().await.is_err());
        assert_eq!(source.get_block_number().await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_mock_subscription_delivers() {
        let source = MockChainLogSource::new(1, CONTRACT, 200);
        let mut rx = source.subscribe(CONTRACT).await.unwrap();
        source.emit_log(MockChainLogSource::encode_log(
            CONTRACT,
            "JobCancelled",
            serde_json::json!({"job_id": 1}),
            201,
            [7; 32],
            0,
        ));
        let log = rx.recv().await.unwrap();
        assert_eq!(log.block_number, 201);
    }
}
