//! # Escrow Protocol Events
//!
//! Closed union of the events the escrow contract emits. Adding an event is a
//! compile-time change: the handler dispatch in `handlers.rs` matches
//! exhaustively.
//!
//! Events use serde's external tagging (`{"JobCreated": {..args}}`), which
//! deserializes each variant straight from its arguments. Amounts travel as
//! decimal strings so values above `u64::MAX` survive `serde_json::Value`.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, JobId, MilestoneIndex};

use super::errors::ChainSyncError;

/// Decoded escrow lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// Client funded a new job.
    JobCreated {
        job_id: JobId,
        client: Address,
        #[serde(with = "shared_types::amount::decimal_vec")]
        milestone_amounts: Vec<Amount>,
    },
    /// Freelancer accepted the job.
    JobAccepted { job_id: JobId, freelancer: Address },
    /// Freelancer submitted a deliverable.
    MilestoneSubmitted {
        job_id: JobId,
        milestone: MilestoneIndex,
    },
    /// Client approved a deliverable.
    MilestoneApproved {
        job_id: JobId,
        milestone: MilestoneIndex,
    },
    /// Either party opened a dispute.
    DisputeRaised {
        job_id: JobId,
        milestone: Option<MilestoneIndex>,
        raised_by: Address,
    },
    /// Arbiter closed a dispute.
    DisputeResolved {
        job_id: JobId,
        milestone: Option<MilestoneIndex>,
        in_favor_of_freelancer: bool,
    },
    /// Contract paid out escrowed funds.
    FundsReleased {
        job_id: JobId,
        milestone: MilestoneIndex,
        recipient: Address,
        #[serde(with = "shared_types::amount::decimal")]
        amount: Amount,
    },
    /// Job cancelled and remaining escrow refunded.
    JobCancelled { job_id: JobId },
}

impl EscrowEvent {
    /// Every event name of the protocol.
    pub const NAMES: [&'static str; 8] = [
        "JobCreated",
        "JobAccepted",
        "MilestoneSubmitted",
        "MilestoneApproved",
        "DisputeRaised",
        "DisputeResolved",
        "FundsReleased",
        "JobCancelled",
    ];

    /// Decode a parsed `{name, args}` pair.
    pub fn decode(name: &str, args: &serde_json::Value) -> Result<Self, ChainSyncError> {
        if !Self::NAMES.contains(&name) {
            return Err(ChainSyncError::UnknownEvent(name.to_string()));
        }
        let mut tagged = serde_json::Map::with_capacity(1);
        tagged.insert(name.to_string(), args.clone());
        serde_json::from_value(serde_json::Value::Object(tagged)).map_err(|e| ChainSyncError::InvalidEventArgs {
            event: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Contract event name.
    pub fn name(&self) -> &'static str {
        match self {
            EscrowEvent::JobCreated { .. } => "JobCreated",
            EscrowEvent::JobAccepted { .. } => "JobAccepted",
            EscrowEvent::MilestoneSubmitted { .. } => "MilestoneSubmitted",
            EscrowEvent::MilestoneApproved { .. } => "MilestoneApproved",
            EscrowEvent::DisputeRaised { .. } => "DisputeRaised",
            EscrowEvent::DisputeResolved { .. } => "DisputeResolved",
            EscrowEvent::FundsReleased { .. } => "FundsReleased",
            EscrowEvent::JobCancelled { .. } => "JobCancelled",
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            EscrowEvent::JobCreated { job_id, .. }
            | EscrowEvent::JobAccepted { job_id, .. }
            | EscrowEvent::MilestoneSubmitted { job_id, .. }
            | EscrowEvent::MilestoneApproved { job_id, .. }
            | EscrowEvent::DisputeRaised { job_id, .. }
            | EscrowEvent::DisputeResolved { job_id, .. }
            | EscrowEvent::FundsReleased { job_id, .. }
            | EscrowEvent::JobCancelled { job_id } => *job_id,
        }
    }

    pub fn milestone(&self) -> Option<MilestoneIndex> {
        match self {
            EscrowEvent::MilestoneSubmitted { milestone, .. }
            | EscrowEvent::MilestoneApproved { milestone, .. }
            | EscrowEvent::FundsReleased { milestone, .. } => Some(*milestone),
            EscrowEvent::DisputeRaised { milestone, .. }
            | EscrowEvent::DisputeResolved { milestone, .. } => *milestone,
            EscrowEvent::JobCreated { .. }
            | EscrowEvent::JobAccepted { .. }
            | EscrowEvent::JobCancelled { .. } => None,
        }
    }

    /// Arguments as stored in the audit trail.
    pub fn args(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut(self.name()).map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }

    /// Notification name for the job event sink.
    pub fn notification_name(&self) -> &'static str {
        match self {
            EscrowEvent::JobCreated { .. } => "job_created",
            EscrowEvent::JobAccepted { .. } => "job_accepted",
            EscrowEvent::MilestoneSubmitted { .. } => "milestone_submitted",
            EscrowEvent::MilestoneApproved { .. } => "milestone_approved",
            EscrowEvent::DisputeRaised { .. } => "dispute_raised",
            EscrowEvent::DisputeResolved { .. } => "dispute_resolved",
            EscrowEvent::FundsReleased { .. } => "funds_released",
            EscrowEvent::JobCancelled { .. } => "job_cancelled",
        }
    }
}
