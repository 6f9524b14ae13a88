//! # Outbound Ports
//!
//! Collaborators the rule engine needs beyond the shared ports: the quorum
//! manager for `request_multisig` actions and quorum conditions, and an
//! external verifier for `oracle_verified` conditions.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Address, Amount, JobId, MilestoneIndex};
use uuid::Uuid;

use crate::domain::{RuleEngineError, RuleEngineResult};

/// Request to open a release proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigRequest {
    pub job_id: JobId,
    pub milestone: MilestoneIndex,
    pub destination: Address,
    pub amount: Amount,
    pub proposer: Address,
    pub required_signatures: u32,
    /// `None` uses the quorum manager's default.
    pub ttl_secs: Option<u64>,
}

/// Quorum manager as seen by the rule engine.
#[async_trait]
pub trait QuorumGateway: Send + Sync {
    /// Open a release proposal; returns its id.
    async fn request_release(&self, request: MultisigRequest) -> RuleEngineResult<Uuid>;

    /// Whether any proposal for the job reached its threshold.
    async fn quorum_reached(&self, job_id: JobId) -> RuleEngineResult<bool>;
}

/// External verification source.
#[async_trait]
pub trait OracleVerifier: Send + Sync {
    async fn verify(
        &self,
        job_id: JobId,
        milestone: Option<MilestoneIndex>,
        source: &str,
    ) -> RuleEngineResult<bool>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Records requests; quorum state is set by the test.
#[derive(Default)]
pub struct MockQuorumGateway {
    requests: Mutex<Vec<MultisigRequest>>,
    reached: Mutex<HashSet<JobId>>,
    unavailable: Mutex<bool>,
    refuse: Mutex<bool>,
}

impl MockQuorumGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reached(&self, job_id: JobId) {
        self.reached.lock().insert(job_id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    /// Refuse every request, like a quorum manager rejecting the signer set.
    pub fn refuse_all(&self, refuse: bool) {
        *self.refuse.lock() = refuse;
    }

    pub fn requests(&self) -> Vec<MultisigRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl QuorumGateway for MockQuorumGateway {
    async fn request_release(&self, request: MultisigRequest) -> RuleEngineResult<Uuid> {
        if *self.unavailable.lock() {
            return Err(RuleEngineError::QuorumUnavailable("mock offline".into()));
        }
        if *self.refuse.lock() {
            return Err(RuleEngineError::QuorumRejected("signer set refused".into()));
        }
        self.requests.lock().push(request);
        Ok(Uuid::new_v4())
    }

    async fn quorum_reached(&self, job_id: JobId) -> RuleEngineResult<bool> {
        Ok(self.reached.lock().contains(&job_id))
    }
}

/// Verifier that confirms configured `(job, source)` pairs.
#[derive(Default)]
pub struct MockOracleVerifier {
    verified: Mutex<HashSet<(JobId, String)>>,
}

impl MockOracleVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(&self, job_id: JobId, source: &str) {
        self.verified.lock().insert((job_id, source.to_string()));
    }
}

#[async_trait]
impl OracleVerifier for MockOracleVerifier {
    async fn verify(
        &self,
        job_id: JobId,
        _milestone: Option<MilestoneIndex>,
        source: &str,
    ) -> RuleEngineResult<bool> {
        Ok(self.verified.lock().contains(&(job_id, source.to_string())))
    }
}
