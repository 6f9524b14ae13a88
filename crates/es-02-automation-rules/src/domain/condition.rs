//! Rule conditions
//!
//! Each condition is evaluated independently. Job-state conditions are pure
//! functions of the mirror; `multisig_quorum_reached` and `oracle_verified`
//! are resolved by the service through its outbound ports.

use serde::{Deserialize, Serialize};
use shared_types::{Job, Milestone, Timestamp};

/// A single condition of a rule or scheduled payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// The freelancer has delivered the milestone.
    DeliverableSubmitted,
    /// The client approved the milestone.
    ClientApproval,
    /// At least `seconds` have passed since submission, or since the rule
    /// was created when nothing was submitted.
    TimeElapsed { seconds: u64 },
    /// A multi-signature proposal for the job reached its threshold.
    MultisigQuorumReached,
    /// An external verifier confirmed the milestone.
    OracleVerified { source: String },
}

impl Condition {
    pub const KINDS: [&'static str; 5] = [
        "deliverable_submitted",
        "client_approval",
        "time_elapsed",
        "multisig_quorum_reached",
        "oracle_verified",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Condition::DeliverableSubmitted => "deliverable_submitted",
            Condition::ClientApproval => "client_approval",
            Condition::TimeElapsed { .. } => "time_elapsed",
            Condition::MultisigQuorumReached => "multisig_quorum_reached",
            Condition::OracleVerified { .. } => "oracle_verified",
        }
    }

    /// Evaluate against job state. `None` for conditions that need an
    /// outbound port.
    pub fn evaluate_local(&self, ctx: &ConditionContext<'_>) -> Option<bool> {
        match self {
            Condition::DeliverableSubmitted => {
                Some(ctx.milestone.is_some_and(Milestone::is_delivered))
            }
            Condition::ClientApproval => {
                Some(ctx.milestone.is_some_and(Milestone::is_client_approved))
            }
            Condition::TimeElapsed { seconds } => {
                let anchor = ctx
                    .milestone
                    .and_then(|m| m.submitted_at)
                    .unwrap_or(ctx.created_at);
                Some(ctx.now >= anchor.saturating_add(*seconds))
            }
            Condition::MultisigQuorumReached | Condition::OracleVerified { .. } => None,
        }
    }
}

/// State a condition is evaluated against.
pub struct ConditionContext<'a> {
    pub job: &'a Job,
    pub milestone: Option<&'a Milestone>,
    /// Creation time of the rule or scheduled payment.
    pub created_at: Timestamp,
    pub now: Timestamp,
}
