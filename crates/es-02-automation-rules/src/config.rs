//! Rule engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{Address, RetryPolicy};

/// Automation Rule Engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleEngineConfig {
    /// Escrow contract whose balance backs the pre-flight check.
    pub contract_address: Address,
    /// Interval of the periodic scheduler.
    pub tick_interval_ms: u64,
    /// Timeout and retry budget for settlement calls.
    pub settlement_retry: RetryPolicy,
    /// How long deactivated rules are kept.
    pub rule_retention_secs: u64,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            contract_address: [0u8; 20],
            tick_interval_ms: 60_000,
            settlement_retry: RetryPolicy::default(),
            rule_retention_secs: 30 * 24 * 3600,
        }
    }
}

impl RuleEngineConfig {
    pub fn for_testing(contract_address: Address) -> Self {
        Self {
            contract_address,
            tick_interval_ms: 20,
            settlement_retry: RetryPolicy::for_testing(),
            rule_retention_secs: 3600,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn rule_retention(&self) -> Duration {
        Duration::from_secs(self.rule_retention_secs)
    }
}
