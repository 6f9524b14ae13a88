//! Driving Ports (API - Inbound)

use async_trait::async_trait;
use shared_types::{Address, Amount, Hash, JobId, Timestamp};
use uuid::Uuid;

use crate::domain::{MultiSigProposal, ProposalFilter, ProposalType, QuorumResult, Signature};

/// Request to open a proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalRequest {
    pub job_id: JobId,
    pub proposal_type: ProposalType,
    pub destination: Address,
    pub amount: Amount,
    pub data: Vec<u8>,
    pub proposer: Address,
    pub required_signatures: u32,
    /// `None` uses the configured default.
    pub ttl_secs: Option<u64>,
}

/// Primary quorum manager API.
#[async_trait]
pub trait QuorumApi: Send + Sync {
    /// Open a proposal. The proposer is recorded as the first signer.
    async fn propose(&self, request: ProposalRequest) -> QuorumResult<MultiSigProposal>;

    /// Append a signature over the proposal digest.
    async fn sign(
        &self,
        proposal_id: Uuid,
        signer: Address,
        signature: Signature,
    ) -> QuorumResult<MultiSigProposal>;

    /// Dispatch the settlement call of a ready proposal.
    async fn execute(&self, proposal_id: Uuid, executor: Address)
        -> QuorumResult<MultiSigProposal>;

    async fn cancel(&self, proposal_id: Uuid, canceler: Address)
        -> QuorumResult<MultiSigProposal>;

    /// Expire every non-terminal proposal past its deadline. Returns the count.
    async fn sweep_expired(&self, now: Timestamp) -> QuorumResult<usize>;

    async fn get_proposal(&self, proposal_id: Uuid) -> QuorumResult<MultiSigProposal>;

    async fn list_proposals(&self, filter: ProposalFilter) -> QuorumResult<Vec<MultiSigProposal>>;

    /// Whether any proposal for the job reached its threshold.
    async fn quorum_reached(&self, job_id: JobId) -> QuorumResult<bool>;

    /// The digest remote signers must sign.
    async fn digest(&self, proposal_id: Uuid) -> QuorumResult<Hash>;
}
