//! Chain synchronizer configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{Address, RetryPolicy};

use crate::domain::ChainSyncError;

/// Chain Event Synchronizer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSyncConfig {
    /// Network the endpoint must report.
    pub network_id: u64,
    /// Escrow contract whose logs are mirrored.
    pub contract_address: Address,
    /// Blocks per `get_logs` batch.
    pub batch_size: u64,
    /// Blocks behind head to start from when no checkpoint exists.
    pub safety_margin_blocks: u64,
    /// Reconciliation poll interval.
    pub poll_interval_ms: u64,
    /// Jobs whose handlers may run at the same time within a batch.
    pub handler_concurrency: usize,
    /// Consecutive failed sync attempts before the synchronizer halts.
    pub max_sync_attempts: u8,
    /// Per-call timeout and retry budget for provider calls.
    pub retry: RetryPolicy,
    /// Lifetime of the cursor's cache mirror.
    pub cursor_cache_ttl_secs: u64,
}

impl Default for ChainSyncConfig {
    fn default() -> Self {
        Self {
            network_id: 1,
            contract_address: [0u8; 20],
            batch_size: 1_000,
            safety_margin_blocks: 12,
            poll_interval_ms: 15_000,
            handler_concurrency: 8,
            max_sync_attempts: 5,
            retry: RetryPolicy::default(),
            cursor_cache_ttl_secs: 3_600,
        }
    }
}

impl ChainSyncConfig {
    /// Create config for testing with fast timings.
    pub fn for_testing(contract_address: Address) -> Self {
        Self {
            network_id: 31_337,
            contract_address,
            batch_size: 10,
            safety_margin_blocks: 12,
            poll_interval_ms: 20,
            handler_concurrency: 4,
            max_sync_attempts: 2,
            retry: RetryPolicy::for_testing(),
            cursor_cache_ttl_secs: 60,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cursor_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cursor_cache_ttl_secs)
    }

    /// Reject malformed configuration before touching the endpoint.
    pub fn validate(&self) -> Result<(), ChainSyncError> {
        if self.contract_address == [0u8; 20] {
            return Err(ChainSyncError::InvalidConfig(
                "contract_address must not be the zero address".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ChainSyncError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.handler_concurrency == 0 {
            return Err(ChainSyncError::InvalidConfig(
                "handler_concurrency must be > 0".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ChainSyncError::InvalidConfig(
                "poll_interval_ms must be > 0".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ChainSyncError::InvalidConfig(
                "retry.max_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}
