//! # Adapter Implementations
//!
//! Port implementations that connect the subsystems to each other:
//!
//! - [`QuorumGatewayAdapter`]: the rule engine's `QuorumGateway` backed by
//!   the quorum manager
//! - [`TracingEventSink`]: job notifications written to the log

use std::sync::Arc;

use async_trait::async_trait;
use es_02_automation_rules::{
    MultisigRequest, QuorumGateway, RuleEngineError, RuleEngineResult,
};
use es_03_authorization_quorum::{
    ProposalRequest, ProposalType, QuorumApi, QuorumError, QuorumService,
};
use shared_types::{Classified, JobEventSink, JobId};
use tracing::info;
use uuid::Uuid;

/// Rule engine → quorum manager.
///
/// `request_multisig` actions open a `release_payment` proposal whose data
/// field carries the milestone index, so signers see which milestone they
/// authorize.
#[derive(Clone)]
pub struct QuorumGatewayAdapter {
    quorum: Arc<QuorumService>,
}

impl QuorumGatewayAdapter {
    pub fn new(quorum: Arc<QuorumService>) -> Self {
        Self { quorum }
    }
}

/// Transient failures stay retryable for the rule engine; everything else is
/// a refusal.
fn map_quorum_error(err: QuorumError) -> RuleEngineError {
    if err.class().is_retryable() {
        RuleEngineError::QuorumUnavailable(err.to_string())
    } else {
        RuleEngineError::QuorumRejected(err.to_string())
    }
}

#[async_trait]
impl QuorumGateway for QuorumGatewayAdapter {
    async fn request_release(&self, request: MultisigRequest) -> RuleEngineResult<Uuid> {
        let proposal = self
            .quorum
            .propose(ProposalRequest {
                job_id: request.job_id,
                proposal_type: ProposalType::ReleasePayment,
                destination: request.destination,
                amount: request.amount,
                data: request.milestone.to_be_bytes().to_vec(),
                proposer: request.proposer,
                required_signatures: request.required_signatures,
                ttl_secs: request.ttl_secs,
            })
            .await
            .map_err(map_quorum_error)?;
        Ok(proposal.id)
    }

    async fn quorum_reached(&self, job_id: JobId) -> RuleEngineResult<bool> {
        self.quorum
            .quorum_reached(job_id)
            .await
            .map_err(map_quorum_error)
    }
}

/// Writes every job notification as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl JobEventSink for TracingEventSink {
    fn on_job_event(&self, job_id: JobId, name: &str, payload: serde_json::Value) {
        info!(job_id, event = name, %payload, "Job event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use es_03_authorization_quorum::{ProposalStatus, QuorumConfig, QuorumPorts};
    use shared_types::memory::{
        InMemoryDurableStore, ManualClock, MockSettlementGateway, RecordingEventSink,
    };
    use shared_types::ErrorClass;

    fn quorum(config: QuorumConfig) -> Arc<QuorumService> {
        let clock = Arc::new(ManualClock::new(1_000));
        Arc::new(QuorumService::new(
            config,
            QuorumPorts {
                store: Arc::new(InMemoryDurableStore::new(clock.clone())),
                settlement: Arc::new(MockSettlementGateway::with_balance(1_000)),
                sink: Arc::new(RecordingEventSink::new()),
                clock,
            },
        ))
    }

    fn request(proposer: [u8; 20]) -> MultisigRequest {
        MultisigRequest {
            job_id: 42,
            milestone: 3,
            destination: [0xF1; 20],
            amount: 500,
            proposer,
            required_signatures: 2,
            ttl_secs: None,
        }
    }

    #[tokio::test]
    async fn test_request_release_opens_proposal() {
        let quorum = quorum(QuorumConfig::for_testing());
        let adapter = QuorumGatewayAdapter::new(quorum.clone());

        let id = adapter.request_release(request([0x01; 20])).await.unwrap();
        let proposal = quorum.get_proposal(id).await.unwrap();

        assert_eq!(proposal.proposal_type, ProposalType::ReleasePayment);
        assert_eq!(proposal.data, vec![0, 0, 0, 3]);
        assert_eq!(proposal.signatures, vec![[0x01; 20]]);
        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert!(!adapter.quorum_reached(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_refusal_maps_to_rejected() {
        let quorum = quorum(QuorumConfig::for_testing().with_signers([[0x02; 20]]));
        let adapter = QuorumGatewayAdapter::new(quorum);

        let err = adapter.request_release(request([0x01; 20])).await.unwrap_err();
        assert!(matches!(err, RuleEngineError::QuorumRejected(_)));
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[test]
    fn test_transient_maps_to_unavailable() {
        let err = map_quorum_error(QuorumError::Settlement(
            shared_types::GatewayError::Transport("reset".into()),
        ));
        assert!(matches!(err, RuleEngineError::QuorumUnavailable(_)));
    }
}
