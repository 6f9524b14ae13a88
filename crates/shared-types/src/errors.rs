//! # Error Types
//!
//! The shared error taxonomy plus the errors raised by shared ports.

use thiserror::Error;

use crate::retry::CallTimeout;

/// How a failure must be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed configuration or contract mismatch. Fatal, never retried.
    Configuration,
    /// Provider or network hiccup. Retried with backoff.
    TransientNetwork,
    /// Rejected input (bad signature, unknown trigger). Never retried.
    Validation,
    /// Business precondition not met yet. Left pending for a later attempt.
    DomainPrecondition,
    /// Unexpected internal failure. Logged and recorded against the entity.
    Fault,
}

impl ErrorClass {
    /// Only transient network failures are worth an immediate retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::TransientNetwork)
    }
}

/// Errors that know their place in the taxonomy.
pub trait Classified {
    fn class(&self) -> ErrorClass;
}

/// Errors raised by the durable store and the job store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend unreachable or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes could not be decoded.
    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Value could not be encoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl Classified for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Unavailable(_) => ErrorClass::TransientNetwork,
            StoreError::Corrupt { .. } | StoreError::Serialization(_) => ErrorClass::Fault,
        }
    }
}

impl From<CallTimeout> for StoreError {
    fn from(timeout: CallTimeout) -> Self {
        StoreError::Unavailable(timeout.to_string())
    }
}

/// Errors raised by the settlement interface.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// RPC failure that may succeed on retry.
    #[error("Settlement transport error: {0}")]
    Transport(String),

    /// The call exceeded its deadline.
    #[error("Settlement call timed out: {0}")]
    Timeout(String),

    /// The contract rejected the call (already settled, bad state).
    #[error("Settlement rejected: {0}")]
    Rejected(String),
}

impl Classified for GatewayError {
    fn class(&self) -> ErrorClass {
        match self {
            GatewayError::Transport(_) | GatewayError::Timeout(_) => ErrorClass::TransientNetwork,
            GatewayError::Rejected(_) => ErrorClass::DomainPrecondition,
        }
    }
}

impl From<CallTimeout> for GatewayError {
    fn from(timeout: CallTimeout) -> Self {
        GatewayError::Timeout(timeout.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ErrorClass::TransientNetwork.is_retryable());
        assert!(!ErrorClass::Configuration.is_retryable());
        assert!(!ErrorClass::Validation.is_retryable());
        assert!(!ErrorClass::DomainPrecondition.is_retryable());
        assert!(!ErrorClass::Fault.is_retryable());
    }

    #[test]
    fn test_gateway_error_classes() {
        assert_eq!(
            GatewayError::Transport("reset".into()).class(),
            ErrorClass::TransientNetwork
        );
        assert_eq!(
            GatewayError::Rejected("already released".into()).class(),
            ErrorClass::DomainPrecondition
        );
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Corrupt {
            key: "rule:1".into(),
            reason: "eof".into(),
        };
        assert!(err.to_string().contains("rule:1"));
        assert_eq!(err.class(), ErrorClass::Fault);
    }
}
