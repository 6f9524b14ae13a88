//! Quorum manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{Address, RetryPolicy};

use crate::domain::QuorumError;

/// Authorization Quorum Manager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuorumConfig {
    /// TTL applied when a proposal does not name one.
    pub default_ttl_secs: u64,
    /// Upper bound on any requested TTL.
    pub max_ttl_secs: u64,
    /// Owners allowed to propose, sign and execute. Empty disables the check.
    pub authorized_signers: Vec<Address>,
    /// Timeout and retry budget for the settlement call on execute.
    pub settlement_retry: RetryPolicy,
    /// How long terminal proposals stay queryable.
    pub terminal_retention_secs: u64,
    /// Interval of the expiry sweep.
    pub sweep_interval_ms: u64,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 24 * 3600,
            max_ttl_secs: 7 * 24 * 3600,
            authorized_signers: Vec::new(),
            settlement_retry: RetryPolicy::default(),
            terminal_retention_secs: 30 * 24 * 3600,
            sweep_interval_ms: 60_000,
        }
    }
}

impl QuorumConfig {
    pub fn for_testing() -> Self {
        Self {
            settlement_retry: RetryPolicy::for_testing(),
            sweep_interval_ms: 20,
            ..Default::default()
        }
    }

    pub fn with_signers(mut self, signers: impl IntoIterator<Item = Address>) -> Self {
        self.authorized_signers = signers.into_iter().collect();
        self
    }

    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn is_authorized(&self, address: &Address) -> bool {
        self.authorized_signers.is_empty() || self.authorized_signers.contains(address)
    }

    pub fn validate(&self) -> Result<(), QuorumError> {
        if self.default_ttl_secs == 0 {
            return Err(QuorumError::InvalidConfig(
                "default_ttl_secs must be > 0".into(),
            ));
        }
        if self.default_ttl_secs > self.max_ttl_secs {
            return Err(QuorumError::InvalidConfig(format!(
                "default_ttl_secs {} exceeds max_ttl_secs {}",
                self.default_ttl_secs, self.max_ttl_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QuorumConfig::default();
        assert_eq!(config.default_ttl_secs, 86_400);
        assert!(config.validate().is_ok());
        assert!(config.is_authorized(&[7; 20]));
    }

    #[test]
    fn test_authorized_set() {
        let config = QuorumConfig::default().with_signers([[1; 20], [2; 20]]);
        assert!(config.is_authorized(&[1; 20]));
        assert!(!config.is_authorized(&[3; 20]));
    }

    #[test]
    fn test_ttl_bounds() {
        let config = QuorumConfig {
            default_ttl_secs: 10 * 24 * 3600,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
