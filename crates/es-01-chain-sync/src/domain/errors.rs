//! # Domain Errors
//!
//! Error types for the Chain Event Synchronizer.

use shared_types::{
    CallTimeout, Classified, ErrorClass, JobId, MilestoneIndex, StoreError, TxHash,
};
use thiserror::Error;

/// Chain synchronizer errors.
#[derive(Debug, Error)]
pub enum ChainSyncError {
    /// Malformed configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Endpoint reports a different network than configured.
    #[error("Network mismatch: configured {expected}, endpoint reports {actual}")]
    NetworkMismatch {
        /// Configured network id
        expected: u64,
        /// Network id reported by the endpoint
        actual: u64,
    },

    /// No contract code at the configured address.
    #[error("No escrow contract deployed at {0}")]
    ContractNotFound(String),

    /// Provider failure that may succeed on retry.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A provider call exceeded its deadline.
    #[error("Provider timeout: {0}")]
    Timeout(String),

    /// Raw log could not be decoded by the provider's ABI.
    #[error("Unparseable log {tx}:{log_index}: {reason}")]
    UnparseableLog {
        /// Transaction hash (hex)
        tx: String,
        /// Log index within the transaction
        log_index: u32,
        /// Decoder message
        reason: String,
    },

    /// Event name outside the escrow protocol.
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Event arguments do not match the protocol shape.
    #[error("Invalid arguments for {event}: {reason}")]
    InvalidEventArgs {
        /// Event name
        event: String,
        /// Decoder message
        reason: String,
    },

    /// Event references a job the mirror has never seen.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Event references a milestone the job does not have.
    #[error("Milestone {milestone} not found on job {job_id}")]
    MilestoneNotFound {
        /// Job id
        job_id: JobId,
        /// Milestone index
        milestone: MilestoneIndex,
    },

    /// Event not found in the audit trail.
    #[error("Event not found: {tx:?}:{log_index}")]
    EventNotFound {
        /// Transaction hash
        tx: TxHash,
        /// Log index
        log_index: u32,
    },

    /// Operation requires `initialize()` first.
    #[error("Synchronizer not initialized")]
    NotInitialized,

    /// Live loop already running.
    #[error("Synchronizer already running")]
    AlreadyRunning,

    /// `stop()` was called while the operation was in flight.
    #[error("Synchronizer stopped")]
    Stopped,

    /// Halted after retry exhaustion; operator restart required.
    #[error("Synchronizer halted: {0}")]
    Halted(String),

    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Classified for ChainSyncError {
    fn class(&self) -> ErrorClass {
        match self {
            ChainSyncError::InvalidConfig(_)
            | ChainSyncError::NetworkMismatch { .. }
            | ChainSyncError::ContractNotFound(_) => ErrorClass::Configuration,
            ChainSyncError::Provider(_) | ChainSyncError::Timeout(_) => {
                ErrorClass::TransientNetwork
            }
            ChainSyncError::UnparseableLog { .. }
            | ChainSyncError::UnknownEvent(_)
            | ChainSyncError::InvalidEventArgs { .. }
            | ChainSyncError::NotInitialized
            | ChainSyncError::AlreadyRunning
            | ChainSyncError::Stopped => ErrorClass::Validation,
            ChainSyncError::JobNotFound(_)
            | ChainSyncError::MilestoneNotFound { .. }
            | ChainSyncError::EventNotFound { .. }
            | ChainSyncError::Halted(_) => ErrorClass::Fault,
            ChainSyncError::Store(inner) => inner.class(),
        }
    }
}

impl From<CallTimeout> for ChainSyncError {
    fn from(timeout: CallTimeout) -> Self {
        ChainSyncError::Timeout(timeout.to_string())
    }
}

/// Result alias for synchronizer operations.
pub type ChainSyncResult<T> = Result<T, ChainSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = ChainSyncError::NetworkMismatch {
            expected: 1,
            actual: 5,
        };
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(!err.class().is_retryable());
        assert!(err.to_string().contains("configured 1"));
    }

    #[test]
    fn test_provider_errors_are_retryable() {
        assert!(ChainSyncError::Provider("429".into()).class().is_retryable());
        assert!(ChainSyncError::Timeout("get_logs".into())
            .class()
            .is_retryable());
    }

    #[test]
    fn test_store_error_keeps_inner_class() {
        let err: ChainSyncError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.class(), ErrorClass::TransientNetwork);
    }

    #[test]
    fn test_unknown_event_is_validation() {
        let err = ChainSyncError::UnknownEvent("Paused".into());
        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(err.to_string().contains("Paused"));
    }
}
