//! # Rule → Proposal → Signatures → Execution
//!
//! A `request_multisig` rule opens a release proposal with the client as
//! proposer. A second owner signs the digest off-line; the signature that
//! reaches the threshold makes the proposal executable.

use std::time::Duration;

use es_01_chain_sync::ChainSyncApi;
use es_02_automation_rules::{
    ActionParameters, ActionType, Condition, RuleEngineApi, RuleSpec, RuleStatus, RuleTrigger,
};
use es_03_authorization_quorum::test_helpers::{generate_signer, sign};
use es_03_authorization_quorum::{
    MultiSigProposal, ProposalFilter, ProposalStatus, QuorumApi, QuorumConfig, QuorumError,
};
use serde_json::json;
use settlement_runtime::SettlementRuntime;
use shared_types::{Address, TriggerType};

use super::harness::{config, Backend, FREELANCER};

struct Owners {
    client: (k256::ecdsa::SigningKey, Address),
    arbiter: (k256::ecdsa::SigningKey, Address),
    ops: (k256::ecdsa::SigningKey, Address),
}

fn owners() -> Owners {
    Owners {
        client: generate_signer(),
        arbiter: generate_signer(),
        ops: generate_signer(),
    }
}

/// Job 42 opened by the client, a 2-of-3 rule on approval, milestone 0
/// approved. Returns the proposal the rule opened.
async fn approved_with_proposal(
    backend: &Backend,
    owners: &Owners,
    ttl_secs: Option<u64>,
) -> (SettlementRuntime, MultiSigProposal) {
    let mut config = config();
    config.quorum = QuorumConfig::for_testing().with_signers([
        owners.client.1,
        owners.arbiter.1,
        owners.ops.1,
    ]);

    backend.open_job(42, owners.client.1);
    let runtime = backend.runtime(config);
    runtime.start().await.unwrap();

    let rule = runtime
        .rules()
        .create_rule(RuleSpec {
            job_id: 42,
            milestone: Some(0),
            trigger: RuleTrigger {
                trigger_type: TriggerType::ApprovalConsensus,
                schedule: None,
            },
            conditions: vec![Condition::ClientApproval],
            action: ActionType::RequestMultisig,
            parameters: ActionParameters {
                proposer: Some(owners.client.1),
                required_signatures: Some(2),
                ttl_secs,
                ..Default::default()
            },
            priority: 0,
        })
        .await
        .unwrap();

    backend.emit(
        "MilestoneApproved",
        json!({ "job_id": 42, "milestone": 0 }),
        3,
    );
    runtime.sync().sync_to_head().await.unwrap();

    assert_eq!(
        runtime.rules().get_rule(rule.id).await.unwrap().status,
        RuleStatus::Executed
    );
    let proposals = runtime
        .quorum()
        .list_proposals(ProposalFilter {
            job_id: Some(42),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(proposals.len(), 1);
    let proposal = proposals.into_iter().next().unwrap();
    (runtime, proposal)
}

#[tokio::test]
async fn test_two_of_three_release() {
    let backend = Backend::new();
    let owners = owners();
    let (runtime, proposal) = approved_with_proposal(&backend, &owners, None).await;

    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert_eq!(proposal.proposer, owners.client.1);
    assert_eq!(proposal.destination, FREELANCER);
    assert_eq!(proposal.amount, 500);
    assert_eq!(proposal.data, vec![0, 0, 0, 0]);
    // Nothing moves before quorum.
    assert!(backend.settlement.releases().is_empty());
    assert!(!runtime.quorum().quorum_reached(42).await.unwrap());

    let digest = runtime.quorum().digest(proposal.id).await.unwrap();
    let signature = sign(&digest, &owners.arbiter.0);
    let ready = runtime
        .quorum()
        .sign(proposal.id, owners.arbiter.1, signature)
        .await
        .unwrap();
    assert_eq!(ready.status, ProposalStatus::ReadyForExecution);
    assert!(runtime.quorum().quorum_reached(42).await.unwrap());

    let executed = runtime
        .quorum()
        .execute(proposal.id, owners.arbiter.1)
        .await
        .unwrap();
    assert_eq!(executed.status, ProposalStatus::Executed);
    assert_eq!(executed.executed_by, Some(owners.arbiter.1));

    let releases = backend.settlement.releases();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].to, FREELANCER);
    assert_eq!(releases[0].amount, 500);
    assert_eq!(Some(releases[0].tx_hash), executed.execution_hash);

    for name in [
        "automation_rule_executed",
        "proposal_created",
        "proposal_signed",
        "proposal_ready",
        "proposal_executed",
    ] {
        assert_eq!(backend.count(name), 1, "{name}");
    }

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_signature_from_wrong_key_is_not_counted() {
    let backend = Backend::new();
    let owners = owners();
    let (runtime, proposal) = approved_with_proposal(&backend, &owners, None).await;

    let digest = runtime.quorum().digest(proposal.id).await.unwrap();
    // Ops signs, but the signature is submitted as the arbiter's.
    let forged = sign(&digest, &owners.ops.0);
    let err = runtime
        .quorum()
        .sign(proposal.id, owners.arbiter.1, forged)
        .await
        .unwrap_err();
    assert!(matches!(err, QuorumError::InvalidSignature(_)));

    let stored = runtime.quorum().get_proposal(proposal.id).await.unwrap();
    assert_eq!(stored.status, ProposalStatus::Pending);
    assert_eq!(stored.signatures, vec![owners.client.1]);

    let err = runtime
        .quorum()
        .execute(proposal.id, owners.client.1)
        .await
        .unwrap_err();
    assert!(matches!(err, QuorumError::NotReady { .. }));
    assert!(backend.settlement.releases().is_empty());

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_unsigned_proposal_expires_in_sweep() {
    let backend = Backend::new();
    let owners = owners();
    let (runtime, proposal) = approved_with_proposal(&backend, &owners, Some(600)).await;
    // Drive the scheduler by hand.
    runtime.shutdown().await;

    backend.clock.advance(Duration::from_secs(601));
    let (_, expired) = runtime.run_scheduled_pass().await;
    assert_eq!(expired, Some(1));

    let stored = runtime.quorum().get_proposal(proposal.id).await.unwrap();
    assert_eq!(stored.status, ProposalStatus::Expired);
    assert_eq!(backend.count("proposal_expired"), 1);

    let digest = runtime.quorum().digest(proposal.id).await.unwrap();
    let late = sign(&digest, &owners.arbiter.0);
    let err = runtime
        .quorum()
        .sign(proposal.id, owners.arbiter.1, late)
        .await
        .unwrap_err();
    assert!(matches!(err, QuorumError::NotPending { .. }));
    assert!(backend.settlement.releases().is_empty());
}
