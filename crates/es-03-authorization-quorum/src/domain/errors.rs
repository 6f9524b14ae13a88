//! # Domain Errors
//!
//! Error types for the Authorization Quorum Manager.

use shared_types::{
    format_address, Address, Classified, ErrorClass, GatewayError, StoreError,
};
use thiserror::Error;
use uuid::Uuid;

use super::proposal::ProposalStatus;

/// Why a signature was not accepted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature length: {0} bytes")]
    InvalidLength(usize),

    /// `r` or `s` outside `[1, n-1]`.
    #[error("Invalid signature format")]
    InvalidFormat,

    /// High `s` (EIP-2).
    #[error("Malleable signature (high S value)")]
    MalleableSignature,

    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// Signature is valid but belongs to someone else.
    #[error("Signer mismatch: expected {}, recovered {}", format_address(.expected), format_address(.actual))]
    SignerMismatch { expected: Address, actual: Address },
}

/// Quorum manager errors.
#[derive(Debug, Error)]
pub enum QuorumError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(Uuid),

    /// Signing or cancelling requires `pending`.
    #[error("Proposal {id} is not pending (status: {status})")]
    NotPending { id: Uuid, status: ProposalStatus },

    /// Execution requires `ready_for_execution`.
    #[error("Proposal {id} is not ready for execution (status: {status})")]
    NotReady { id: Uuid, status: ProposalStatus },

    #[error("Proposal {0} has expired")]
    Expired(Uuid),

    #[error("{} already signed proposal {id}", format_address(.signer))]
    AlreadySigned { id: Uuid, signer: Address },

    #[error("Signature rejected: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// Address outside the authorized owner set.
    #[error("{} is not an authorized signer", format_address(.0))]
    UnauthorizedSigner(Address),

    /// Only the proposer may cancel.
    #[error("{} is not the proposer of {id}", format_address(.caller))]
    NotProposer { id: Uuid, caller: Address },

    /// Executor neither signed nor is an authorized owner.
    #[error("{} may not execute proposal {id}", format_address(.executor))]
    NotExecutor { id: Uuid, executor: Address },

    #[error("Settlement failed: {0}")]
    Settlement(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Classified for QuorumError {
    fn class(&self) -> ErrorClass {
        match self {
            QuorumError::InvalidConfig(_) => ErrorClass::Configuration,
            QuorumError::InvalidProposal(_)
            | QuorumError::ProposalNotFound(_)
            | QuorumError::NotPending { .. }
            | QuorumError::Expired(_)
            | QuorumError::AlreadySigned { .. }
            | QuorumError::InvalidSignature(_)
            | QuorumError::UnauthorizedSigner(_)
            | QuorumError::NotProposer { .. }
            | QuorumError::NotExecutor { .. } => ErrorClass::Validation,
            QuorumError::NotReady { .. } => ErrorClass::DomainPrecondition,
            QuorumError::Settlement(e) => e.class(),
            QuorumError::Store(e) => e.class(),
        }
    }
}

/// Result type for quorum operations.
pub type QuorumResult<T> = Result<T, QuorumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_failures_are_client_errors() {
        let err = QuorumError::from(SignatureError::RecoveryFailed);
        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(!err.class().is_retryable());
    }

    #[test]
    fn test_settlement_class_passes_through() {
        let err = QuorumError::from(GatewayError::Timeout("10s".into()));
        assert!(err.class().is_retryable());
    }

    #[test]
    fn test_messages_name_addresses() {
        let err = QuorumError::UnauthorizedSigner([0xAB; 20]);
        assert!(err.to_string().starts_with("0xabab"));
    }
}
