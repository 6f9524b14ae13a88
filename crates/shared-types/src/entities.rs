//! # Core Domain Entities
//!
//! Jobs, milestones and the trigger kinds that flow from the chain
//! synchronizer to the rule engine.
//!
//! ## Clusters
//!
//! - **Identity**: `Address`, `TxHash`, `JobId`, `MilestoneIndex`
//! - **Escrow**: `Job`, `JobStatus`, `Milestone`, `MilestoneStatus`
//! - **Choreography**: `TriggerType`, `DomainTransition`

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 32-byte hash (Keccak-256).
pub type Hash = [u8; 32];

/// Transaction hash of an on-chain call or log.
pub type TxHash = Hash;

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// Escrow job identifier as assigned by the contract.
pub type JobId = u64;

/// Position of a milestone inside its job.
pub type MilestoneIndex = u32;

/// Token amount in base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Render an address as `0x`-prefixed lowercase hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Render a hash as `0x`-prefixed lowercase hex.
pub fn format_hash(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a `0x`-prefixed (or bare) hex string into an address.
pub fn parse_address(input: &str) -> Option<Address> {
    let trimmed = input.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed).ok()?;
    bytes.try_into().ok()
}

// =============================================================================
// CLUSTER B: ESCROW
// =============================================================================

/// Lifecycle of an escrow job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Funded, waiting for a freelancer.
    Open,
    /// Accepted by a freelancer, milestones in progress.
    Active,
    /// A dispute is open; automated settlement is suspended.
    Disputed,
    /// Every milestone was released.
    Completed,
    /// Cancelled by the client or the contract.
    Cancelled,
}

/// Lifecycle of a single milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Submitted,
    Approved,
    Disputed,
    Released,
}

/// A payable unit of work inside a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub index: MilestoneIndex,
    pub amount: Amount,
    pub status: MilestoneStatus,
    /// When the deliverable was submitted.
    pub submitted_at: Option<Timestamp>,
    /// When the client approved the deliverable.
    pub approved_at: Option<Timestamp>,
    /// Amount already paid out for this milestone.
    pub released_amount: Amount,
}

impl Milestone {
    /// Create a pending milestone.
    pub fn new(index: MilestoneIndex, amount: Amount) -> Self {
        Self {
            index,
            amount,
            status: MilestoneStatus::Pending,
            submitted_at: None,
            approved_at: None,
            released_amount: 0,
        }
    }

    /// The freelancer has delivered (submitted, approved or already paid).
    pub fn is_delivered(&self) -> bool {
        matches!(
            self.status,
            MilestoneStatus::Submitted | MilestoneStatus::Approved | MilestoneStatus::Released
        )
    }

    /// The client has signed off on the deliverable.
    pub fn is_client_approved(&self) -> bool {
        matches!(
            self.status,
            MilestoneStatus::Approved | MilestoneStatus::Released
        )
    }

    /// Work is done but no payment has gone out yet.
    /// Escrowed amount not yet paid out.
    pub fn remaining(&self) -> Amount {
        self.amount.saturating_sub(self.released_amount)
    }

    pub fn is_completed_unpaid(&self) -> bool {
        matches!(
            self.status,
            MilestoneStatus::Submitted | MilestoneStatus::Approved
        )
    }
}

/// Off-chain mirror of an escrow job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub client: Address,
    pub freelancer: Option<Address>,
    pub status: JobStatus,
    pub total_amount: Amount,
    pub released_amount: Amount,
    pub milestones: Vec<Milestone>,
    pub updated_at: Timestamp,
    /// Ids of the chain events already folded into this record. Saved with
    /// the mutation, so a replayed event is recognised after a crash.
    #[serde(default)]
    pub applied_events: BTreeSet<String>,
}

impl Job {
    /// Create an open job with one pending milestone per amount.
    pub fn new(id: JobId, client: Address, milestone_amounts: &[Amount], now: Timestamp) -> Self {
        let milestones = milestone_amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| Milestone::new(i as MilestoneIndex, *amount))
            .collect();
        Self {
            id,
            client,
            freelancer: None,
            status: JobStatus::Open,
            total_amount: milestone_amounts.iter().sum(),
            released_amount: 0,
            milestones,
            updated_at: now,
            applied_events: BTreeSet::new(),
        }
    }

    pub fn has_applied(&self, event_id: &str) -> bool {
        self.applied_events.contains(event_id)
    }

    /// Remember an applied event. `false` when it was already recorded.
    pub fn record_event(&mut self, event_id: &str) -> bool {
        self.applied_events.insert(event_id.to_string())
    }

    pub fn milestone(&self, index: MilestoneIndex) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.index == index)
    }

    pub fn milestone_mut(&mut self, index: MilestoneIndex) -> Option<&mut Milestone> {
        self.milestones.iter_mut().find(|m| m.index == index)
    }

    /// Automated settlement is allowed only while the job is live and undisputed.
    pub fn accepts_settlement(&self) -> bool {
        !matches!(self.status, JobStatus::Cancelled | JobStatus::Disputed)
    }

    /// Every milestone has been released.
    pub fn is_fully_released(&self) -> bool {
        !self.milestones.is_empty()
            && self
                .milestones
                .iter()
                .all(|m| m.status == MilestoneStatus::Released)
    }
}

// =============================================================================
// CLUSTER C: CHOREOGRAPHY
// =============================================================================

/// Category of occurrence that makes an automation rule eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    TimeBased,
    MilestoneCompletion,
    ApprovalConsensus,
    DisputeResolution,
    ExternalCall,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TimeBased => "time_based",
            Self::MilestoneCompletion => "milestone_completion",
            Self::ApprovalConsensus => "approval_consensus",
            Self::DisputeResolution => "dispute_resolution",
            Self::ExternalCall => "external_call",
        };
        f.write_str(name)
    }
}

/// A domain transition produced by a chain event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTransition {
    pub job_id: JobId,
    pub milestone: Option<MilestoneIndex>,
    pub trigger: TriggerType,
}
