//! Runtime configuration.
//!
//! Aggregates the per-subsystem configs plus logging. Defaults come from each
//! subsystem; `ES_*` environment variables override the deployment-specific
//! fields.

use std::env;
use std::str::FromStr;

use es_01_chain_sync::ChainSyncConfig;
use es_02_automation_rules::RuleEngineConfig;
use es_03_authorization_quorum::QuorumConfig;
use serde::{Deserialize, Serialize};
use shared_types::{parse_address, Address};
use thiserror::Error;

/// Configuration that cannot start the runtime.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("contract address must not be the zero address")]
    ZeroContractAddress,

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("{0} retry budget must allow at least one attempt")]
    ZeroRetryBudget(&'static str),

    #[error("Invalid {subsystem} configuration: {reason}")]
    Subsystem {
        subsystem: &'static str,
        reason: String,
    },
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Everything the runtime needs to start.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub chain_sync: ChainSyncConfig,
    pub rules: RuleEngineConfig,
    pub quorum: QuorumConfig,
    pub log: LogConfig,
}

impl SettlementConfig {
    /// Fast timings against one contract.
    pub fn for_testing(contract_address: Address) -> Self {
        Self {
            chain_sync: ChainSyncConfig::for_testing(contract_address),
            rules: RuleEngineConfig::for_testing(contract_address),
            quorum: QuorumConfig::for_testing(),
            log: LogConfig::default(),
        }
    }

    /// Defaults with environment overrides.
    ///
    /// # Environment Variables
    ///
    /// - `ES_NETWORK_ID`: network the endpoint must report
    /// - `ES_CONTRACT_ADDRESS`: escrow contract (shared by sync and rules)
    /// - `ES_BATCH_SIZE`: blocks per log query
    /// - `ES_POLL_INTERVAL_SECS`: reconciliation poll interval
    /// - `ES_AUTHORIZED_SIGNERS`: comma-separated owner addresses
    /// - `ES_LOG_JSON`: `true`/`1` for JSON logs
    /// - `ES_LOG_LEVEL` or `RUST_LOG`: log filter (default: info)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(network_id) = parse_var::<u64, _>(&lookup, "ES_NETWORK_ID")? {
            config.chain_sync.network_id = network_id;
        }
        if let Some(raw) = lookup("ES_CONTRACT_ADDRESS") {
            let address = parse_address(&raw).ok_or_else(|| ConfigError::InvalidEnv {
                name: "ES_CONTRACT_ADDRESS",
                reason: format!("not a 20-byte hex address: {raw}"),
            })?;
            config.chain_sync.contract_address = address;
            config.rules.contract_address = address;
        }
        if let Some(batch_size) = parse_var::<u64, _>(&lookup, "ES_BATCH_SIZE")? {
            config.chain_sync.batch_size = batch_size;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ES_POLL_INTERVAL_SECS")? {
            config.chain_sync.poll_interval_ms = secs.saturating_mul(1_000);
        }
        if let Some(raw) = lookup("ES_AUTHORIZED_SIGNERS") {
            config.quorum.authorized_signers = parse_signers(&raw)?;
        }
        if let Some(raw) = lookup("ES_LOG_JSON") {
            config.log.json = raw.eq_ignore_ascii_case("true") || raw == "1";
        }
        if let Some(level) = lookup("ES_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            config.log.level = level;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_sync.contract_address == [0u8; 20]
            || self.rules.contract_address == [0u8; 20]
        {
            return Err(ConfigError::ZeroContractAddress);
        }
        if self.chain_sync.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.chain_sync.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryBudget("chain sync"));
        }
        if self.rules.settlement_retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryBudget("rule engine"));
        }
        if self.quorum.settlement_retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryBudget("quorum"));
        }
        self.chain_sync
            .validate()
            .map_err(|e| ConfigError::Subsystem {
                subsystem: "chain sync",
                reason: e.to_string(),
            })?;
        self.quorum.validate().map_err(|e| ConfigError::Subsystem {
            subsystem: "quorum",
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidEnv {
                name,
                reason: e.to_string(),
            }),
    }
}

fn parse_signers(raw: &str) -> Result<Vec<Address>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse_address(s).ok_or_else(|| ConfigError::InvalidEnv {
                name: "ES_AUTHORIZED_SIGNERS",
                reason: format!("not a 20-byte hex address: {s}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_need_a_contract() {
        let config = SettlementConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.validate(), Err(ConfigError::ZeroContractAddress));
    }

    #[test]
    fn test_env_overrides() {
        let config = SettlementConfig::from_lookup(lookup(&[
            ("ES_NETWORK_ID", "137"),
            ("ES_CONTRACT_ADDRESS", "0xc0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0"),
            ("ES_BATCH_SIZE", "250"),
            ("ES_POLL_INTERVAL_SECS", "5"),
            (
                "ES_AUTHORIZED_SIGNERS",
                "0x0101010101010101010101010101010101010101, 0202020202020202020202020202020202020202",
            ),
            ("ES_LOG_JSON", "1"),
        ]))
        .unwrap();

        assert_eq!(config.chain_sync.network_id, 137);
        assert_eq!(config.chain_sync.contract_address, [0xC0; 20]);
        assert_eq!(config.rules.contract_address, [0xC0; 20]);
        assert_eq!(config.chain_sync.batch_size, 250);
        assert_eq!(config.chain_sync.poll_interval_ms, 5_000);
        assert_eq!(config.quorum.authorized_signers, vec![[0x01; 20], [0x02; 20]]);
        assert!(config.log.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_values_rejected() {
        let err = SettlementConfig::from_lookup(lookup(&[("ES_BATCH_SIZE", "many")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "ES_BATCH_SIZE",
                ..
            }
        ));

        let err =
            SettlementConfig::from_lookup(lookup(&[("ES_AUTHORIZED_SIGNERS", "0x01,0x02")]))
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "ES_AUTHORIZED_SIGNERS",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_batch_and_retry_budget() {
        let mut config = SettlementConfig::for_testing([0xC0; 20]);
        assert!(config.validate().is_ok());

        config.chain_sync.batch_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));

        let mut config = SettlementConfig::for_testing([0xC0; 20]);
        config.rules.settlement_retry.max_attempts = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroRetryBudget("rule engine"))
        );
    }

    #[test]
    fn test_subsystem_validation_surfaces() {
        let mut config = SettlementConfig::for_testing([0xC0; 20]);
        config.quorum.default_ttl_secs = config.quorum.max_ttl_secs + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Subsystem {
                subsystem: "quorum",
                ..
            })
        ));
    }
}
