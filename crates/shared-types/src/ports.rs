//! # Outbound Ports
//!
//! Interfaces the settlement core requires from its host application.
//!
//! | Port | Production | Testing |
//! |------|------------|---------|
//! | `DurableStore` | Database with TTL support | `InMemoryDurableStore` |
//! | `JobStore` | Platform job/milestone tables | `InMemoryJobStore` |
//! | `SettlementGateway` | Escrow contract client | `MockSettlementGateway` |
//! | `JobEventSink` | Notification layer | `RecordingEventSink` |
//! | `TimeSource` | `SystemClock` | `ManualClock` |

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entities::{Address, Amount, DomainTransition, Job, JobId, Timestamp, TxHash};
use crate::errors::{GatewayError, StoreError};

/// Key-value persistence with optional per-record expiry.
///
/// Source of truth for cursor, events, rules and proposals. Keys are
/// namespaced strings (`cursor:…`, `event:…`, `rule:…`, `proposal:…`).
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Get a value by key. Expired records read as absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a value, replacing any existing one. `ttl = None` keeps it forever.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
        -> Result<(), StoreError>;

    /// All live records whose key starts with `prefix`, ordered by key.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

/// Read and decode a JSON record.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON record.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn DurableStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.put(key, bytes, ttl).await
}

/// Decode every record under a prefix.
pub async fn scan_json<T: DeserializeOwned>(
    store: &dyn DurableStore,
    prefix: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .scan_prefix(prefix)
        .await?
        .into_iter()
        .map(|(key, bytes)| {
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                key,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Job/milestone records keyed by job id.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    async fn save_job(&self, job: Job) -> Result<(), StoreError>;
}

/// The on-chain call that actually moves escrowed funds.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Release `amount` of job `job_id`'s escrow to `to`.
    async fn release_funds(
        &self,
        job_id: JobId,
        to: Address,
        amount: Amount,
    ) -> Result<TxHash, GatewayError>;

    /// Whether `address` holds at least `amount`.
    async fn check_sufficient_balance(
        &self,
        address: Address,
        amount: Amount,
    ) -> Result<bool, GatewayError>;
}

/// Outbound job notifications, consumed by the notification layer.
pub trait JobEventSink: Send + Sync {
    fn on_job_event(&self, job_id: JobId, name: &str, payload: serde_json::Value);
}

/// Receives domain transitions from the chain synchronizer.
#[async_trait]
pub trait TransitionListener: Send + Sync {
    async fn on_transition(&self, transition: DomainTransition);
}

/// Wall clock abstraction for testability.
pub trait TimeSource: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> Timestamp;
}
