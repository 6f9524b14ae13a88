//! # Multi-Signature Proposals
//!
//! ```text
//! pending ──(≥ required signatures, not expired)──→ ready_for_execution ──(execute)──→ executed
//!    │                                                    │
//!    ├──(cancel)──→ cancelled                             │
//!    └──(expiry sweep)──→ expired ←───(expiry sweep)──────┘
//! ```
//!
//! `executed`, `cancelled` and `expired` are terminal. Every mutation bumps
//! `version`.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, Hash, JobId, Timestamp, TxHash};
use uuid::Uuid;

use super::errors::{QuorumError, QuorumResult};
use super::signature::keccak256;

/// Tag mixed into every digest so proposal signatures cannot be replayed
/// as signatures over anything else.
const DIGEST_DOMAIN: &[u8] = b"escrow-settlement/proposal/v1";

/// Kind of fund movement being authorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    ReleasePayment,
    Refund,
    DisputeSettlement,
    EmergencyWithdrawal,
}

impl ProposalType {
    /// Stable byte used in the digest.
    pub fn tag(self) -> u8 {
        match self {
            ProposalType::ReleasePayment => 0,
            ProposalType::Refund => 1,
            ProposalType::DisputeSettlement => 2,
            ProposalType::EmergencyWithdrawal => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    ReadyForExecution,
    Executed,
    Cancelled,
    Expired,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProposalStatus::Executed | ProposalStatus::Cancelled | ProposalStatus::Expired
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::ReadyForExecution => "ready_for_execution",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Cancelled => "cancelled",
            ProposalStatus::Expired => "expired",
        })
    }
}

/// A fund movement waiting for M-of-N approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSigProposal {
    pub id: Uuid,
    pub job_id: JobId,
    pub proposal_type: ProposalType,
    pub destination: Address,
    pub amount: Amount,
    /// Opaque payload covered by the digest.
    pub data: Vec<u8>,
    pub proposer: Address,
    pub required_signatures: u32,
    /// Distinct signers in signing order; the proposer is first.
    pub signatures: Vec<Address>,
    pub status: ProposalStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub execution_hash: Option<TxHash>,
    pub executed_by: Option<Address>,
    /// Last failed execution attempt.
    pub last_error: Option<String>,
    pub version: u64,
}

impl MultiSigProposal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: JobId,
        proposal_type: ProposalType,
        destination: Address,
        amount: Amount,
        data: Vec<u8>,
        proposer: Address,
        required_signatures: u32,
        now: Timestamp,
        ttl_secs: u64,
    ) -> Self {
        let mut proposal = Self {
            id: Uuid::new_v4(),
            job_id,
            proposal_type,
            destination,
            amount,
            data,
            proposer,
            required_signatures,
            signatures: vec![proposer],
            status: ProposalStatus::Pending,
            created_at: now,
            expires_at: now.saturating_add(ttl_secs),
            execution_hash: None,
            executed_by: None,
            last_error: None,
            version: 0,
        };
        proposal.promote_if_ready();
        proposal
    }

    /// Canonical digest of `(id, type, destination, amount, data)`.
    ///
    /// Layout: domain tag, 16-byte id, type tag, 20-byte destination,
    /// 32-byte big-endian amount, 4-byte big-endian data length, data.
    pub fn digest(&self) -> Hash {
        let mut buf = Vec::with_capacity(DIGEST_DOMAIN.len() + 73 + self.data.len());
        buf.extend_from_slice(DIGEST_DOMAIN);
        buf.extend_from_slice(self.id.as_bytes());
        buf.push(self.proposal_type.tag());
        buf.extend_from_slice(&self.destination);
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.data);
        keccak256(&buf)
    }

    pub fn has_signed(&self, signer: &Address) -> bool {
        self.signatures.contains(signer)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn threshold_met(&self) -> bool {
        self.signatures.len() as u64 >= u64::from(self.required_signatures)
    }

    /// Ready and not expired.
    pub fn is_executable(&self, now: Timestamp) -> bool {
        self.status == ProposalStatus::ReadyForExecution
            && self.threshold_met()
            && !self.is_expired(now)
    }

    /// Append a verified signer. Returns `true` when this signature crossed
    /// the threshold.
    pub fn add_signature(&mut self, signer: Address, now: Timestamp) -> QuorumResult<bool> {
        if self.status != ProposalStatus::Pending {
            return Err(QuorumError::NotPending {
                id: self.id,
                status: self.status,
            });
        }
        if self.is_expired(now) {
            return Err(QuorumError::Expired(self.id));
        }
        if self.has_signed(&signer) {
            return Err(QuorumError::AlreadySigned {
                id: self.id,
                signer,
            });
        }
        self.signatures.push(signer);
        self.version += 1;
        Ok(self.promote_if_ready())
    }

    fn promote_if_ready(&mut self) -> bool {
        if self.status == ProposalStatus::Pending && self.threshold_met() {
            self.status = ProposalStatus::ReadyForExecution;
            return true;
        }
        false
    }

    pub fn mark_executed(&mut self, tx_hash: TxHash, executor: Address) {
        self.status = ProposalStatus::Executed;
        self.execution_hash = Some(tx_hash);
        self.executed_by = Some(executor);
        self.last_error = None;
        self.version += 1;
    }

    pub fn record_failure(&mut self, error: String) {
        self.last_error = Some(error);
        self.version += 1;
    }

    pub fn cancel(&mut self, caller: Address) -> QuorumResult<()> {
        if caller != self.proposer {
            return Err(QuorumError::NotProposer {
                id: self.id,
                caller,
            });
        }
        if self.status != ProposalStatus::Pending {
            return Err(QuorumError::NotPending {
                id: self.id,
                status: self.status,
            });
        }
        self.status = ProposalStatus::Cancelled;
        self.version += 1;
        Ok(())
    }

    /// Expire a non-terminal proposal past its deadline. Returns whether it
    /// changed.
    pub fn expire(&mut self, now: Timestamp) -> bool {
        if self.status.is_terminal() || !self.is_expired(now) {
            return false;
        }
        self.status = ProposalStatus::Expired;
        self.version += 1;
        true
    }
}

/// Query for `list_proposals`. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalFilter {
    pub job_id: Option<JobId>,
    pub status: Option<ProposalStatus>,
    pub proposer: Option<Address>,
    pub signer: Option<Address>,
}

impl ProposalFilter {
    pub fn matches(&self, proposal: &MultiSigProposal) -> bool {
        self.job_id.map_or(true, |j| proposal.job_id == j)
            && self.status.map_or(true, |s| proposal.status == s)
            && self.proposer.map_or(true, |p| proposal.proposer == p)
            && self.signer.map_or(true, |s| proposal.has_signed(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPOSER: Address = [0x01; 20];
    const BOB: Address = [0x02; 20];
    const CAROL: Address = [0x03; 20];

    fn two_of_three() -> MultiSigProposal {
        MultiSigProposal::new(
            7,
            ProposalType::ReleasePayment,
            [0x99; 20],
            500,
            vec![],
            PROPOSER,
            2,
            1_000,
            3_600,
        )
    }

    #[test]
    fn test_proposer_counts_as_first_signature() {
        let proposal = two_of_three();
        assert_eq!(proposal.signatures, vec![PROPOSER]);
        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert_eq!(proposal.expires_at, 4_600);
    }

    #[test]
    fn test_single_signature_threshold_is_ready_immediately() {
        let proposal = MultiSigProposal::new(
            7,
            ProposalType::Refund,
            [0x99; 20],
            1,
            vec![],
            PROPOSER,
            1,
            0,
            60,
        );
        assert_eq!(proposal.status, ProposalStatus::ReadyForExecution);
    }

    #[test]
    fn test_threshold_transition_happens_once() {
        let mut proposal = two_of_three();
        assert!(proposal.add_signature(BOB, 1_001).unwrap());
        assert_eq!(proposal.status, ProposalStatus::ReadyForExecution);
        assert!(matches!(
            proposal.add_signature(CAROL, 1_002),
            Err(QuorumError::NotPending { .. })
        ));
        assert_eq!(proposal.signatures.len(), 2);
    }

    #[test]
    fn test_duplicate_and_expired_signatures_rejected() {
        let mut proposal = two_of_three();
        assert!(matches!(
            proposal.add_signature(PROPOSER, 1_001),
            Err(QuorumError::AlreadySigned { .. })
        ));
        assert!(matches!(
            proposal.add_signature(BOB, 4_600),
            Err(QuorumError::Expired(_))
        ));
    }

    #[test]
    fn test_cancel_is_proposer_only_and_pending_only() {
        let mut proposal = two_of_three();
        assert!(matches!(
            proposal.cancel(BOB),
            Err(QuorumError::NotProposer { .. })
        ));
        proposal.cancel(PROPOSER).unwrap();
        assert_eq!(proposal.status, ProposalStatus::Cancelled);
        assert!(proposal.cancel(PROPOSER).is_err());
    }

    #[test]
    fn test_expire_skips_terminal() {
        let mut proposal = two_of_three();
        assert!(!proposal.expire(4_599));
        assert!(proposal.expire(4_600));
        assert!(!proposal.expire(9_999));

        let mut executed = two_of_three();
        executed.add_signature(BOB, 1_001).unwrap();
        executed.mark_executed([0xAA; 32], BOB);
        assert!(!executed.expire(9_999));
    }

    #[test]
    fn test_digest_binds_every_field() {
        let proposal = two_of_three();
        let base = proposal.digest();
        assert_eq!(base, proposal.digest());

        let mut changed = proposal.clone();
        changed.amount = 501;
        assert_ne!(changed.digest(), base);

        let mut changed = proposal.clone();
        changed.proposal_type = ProposalType::Refund;
        assert_ne!(changed.digest(), base);

        let mut changed = proposal.clone();
        changed.data = vec![1];
        assert_ne!(changed.digest(), base);

        // Signatures and status are not part of what is signed.
        let mut changed = proposal;
        changed.signatures.push(BOB);
        assert_eq!(changed.digest(), base);
    }

    #[test]
    fn test_filter() {
        let proposal = two_of_three();
        assert!(ProposalFilter::default().matches(&proposal));
        assert!(ProposalFilter {
            job_id: Some(7),
            signer: Some(PROPOSER),
            ..Default::default()
        }
        .matches(&proposal));
        assert!(!ProposalFilter {
            status: Some(ProposalStatus::Executed),
            ..Default::default()
        }
        .matches(&proposal));
    }
}
