//! # Domain Errors
//!
//! Error types for the Automation Rule Engine.

use shared_types::{
    CallTimeout, Classified, ErrorClass, GatewayError, JobId, MilestoneIndex, StoreError,
};
use thiserror::Error;
use uuid::Uuid;

/// Rule engine errors.
#[derive(Debug, Error)]
pub enum RuleEngineError {
    /// Rule spec is structurally invalid.
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Unknown trigger type: {0}")]
    UnknownTrigger(String),

    #[error("Unknown condition type: {0}")]
    UnknownCondition(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Referenced job does not exist.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Referenced milestone does not exist on the job.
    #[error("Milestone {milestone} not found on job {job_id}")]
    MilestoneNotFound {
        job_id: JobId,
        milestone: MilestoneIndex,
    },

    #[error("Rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Scheduled payment not found: {0}")]
    PaymentNotFound(Uuid),

    /// Scheduled payment is no longer `scheduled`.
    #[error("Scheduled payment {0} can no longer be cancelled")]
    NotCancellable(Uuid),

    /// Pre-flight check failed; the action may succeed later.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Settlement call failed.
    #[error("Settlement failed: {0}")]
    Settlement(#[from] GatewayError),

    /// Quorum manager refused the request.
    #[error("Quorum request rejected: {0}")]
    QuorumRejected(String),

    /// Quorum manager could not be reached.
    #[error("Quorum manager unavailable: {0}")]
    QuorumUnavailable(String),

    /// External verification source failed.
    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Classified for RuleEngineError {
    fn class(&self) -> ErrorClass {
        match self {
            RuleEngineError::InvalidRule(_)
            | RuleEngineError::UnknownTrigger(_)
            | RuleEngineError::UnknownCondition(_)
            | RuleEngineError::UnknownAction(_)
            | RuleEngineError::JobNotFound(_)
            | RuleEngineError::MilestoneNotFound { .. }
            | RuleEngineError::RuleNotFound(_)
            | RuleEngineError::PaymentNotFound(_)
            | RuleEngineError::NotCancellable(_)
            | RuleEngineError::QuorumRejected(_) => ErrorClass::Validation,
            RuleEngineError::Precondition(_) => ErrorClass::DomainPrecondition,
            RuleEngineError::QuorumUnavailable(_)
            | RuleEngineError::Oracle(_)
            | RuleEngineError::Timeout(_) => ErrorClass::TransientNetwork,
            RuleEngineError::Settlement(inner) => inner.class(),
            RuleEngineError::Store(inner) => inner.class(),
        }
    }
}

impl From<CallTimeout> for RuleEngineError {
    fn from(timeout: CallTimeout) -> Self {
        RuleEngineError::Timeout(timeout.to_string())
    }
}

pub type RuleEngineResult<T> = Result<T, RuleEngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            RuleEngineError::UnknownTrigger("x".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            RuleEngineError::Precondition("disputed".into()).class(),
            ErrorClass::DomainPrecondition
        );
        assert!(RuleEngineError::Settlement(GatewayError::Transport("reset".into()))
            .class()
            .is_retryable());
        assert_eq!(
            RuleEngineError::Settlement(GatewayError::Rejected("settled".into())).class(),
            ErrorClass::DomainPrecondition
        );
    }
}
