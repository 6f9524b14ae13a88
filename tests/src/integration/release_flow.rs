//! # Chain Events → Rule → Settlement
//!
//! ```text
//! MilestoneApproved log ──→ es-01 handler ──→ Job mirror updated
//!                                  │
//!                                  └──ApprovalConsensus──→ es-02 rule ──→ release_funds
//! ```

use es_01_chain_sync::ChainSyncApi;
use es_02_automation_rules::{
    ActionParameters, ActionType, Condition, RuleEngineApi, RuleSpec, RuleStatus, RuleTrigger,
};
use serde_json::json;
use shared_types::{JobStatus, MilestoneStatus, TriggerType};

use super::harness::{config, Backend, FREELANCER};

const CLIENT: [u8; 20] = [0x11; 20];

fn rule(trigger: TriggerType, conditions: Vec<Condition>) -> RuleSpec {
    RuleSpec {
        job_id: 42,
        milestone: Some(0),
        trigger: RuleTrigger {
            trigger_type: trigger,
            schedule: None,
        },
        conditions,
        action: ActionType::ReleasePayment,
        parameters: ActionParameters::default(),
        priority: 0,
    }
}

#[tokio::test]
async fn test_approval_releases_once_across_rescans() {
    let backend = Backend::new();
    backend.open_job(42, CLIENT);
    let runtime = backend.runtime(config());
    runtime.start().await.unwrap();

    let created = runtime
        .rules()
        .create_rule(rule(
            TriggerType::ApprovalConsensus,
            vec![Condition::DeliverableSubmitted, Condition::ClientApproval],
        ))
        .await
        .unwrap();

    backend.emit(
        "MilestoneSubmitted",
        json!({ "job_id": 42, "milestone": 0 }),
        3,
    );
    backend.emit(
        "MilestoneApproved",
        json!({ "job_id": 42, "milestone": 0 }),
        4,
    );
    runtime.sync().sync_to_head().await.unwrap();

    let releases = backend.settlement.releases();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].to, FREELANCER);
    assert_eq!(releases[0].amount, 500);

    let executed = runtime.rules().get_rule(created.id).await.unwrap();
    assert_eq!(executed.status, RuleStatus::Executed);
    assert!(executed.execution.is_some());

    // Replaying the same range applies nothing twice.
    runtime.sync().force_resync(1).await.unwrap();
    runtime.sync().sync_to_head().await.unwrap();
    assert_eq!(backend.settlement.releases().len(), 1);
    assert_eq!(backend.count("milestone_approved"), 1);
    assert_eq!(backend.count("automation_rule_executed"), 1);

    // The contract's own confirmation closes the milestone in the mirror.
    backend.emit(
        "FundsReleased",
        json!({ "job_id": 42, "milestone": 0, "recipient": FREELANCER, "amount": 500 }),
        5,
    );
    runtime.sync().sync_to_head().await.unwrap();
    let job = backend.jobs.snapshot(42).unwrap();
    assert_eq!(job.milestones[0].status, MilestoneStatus::Released);
    assert_eq!(job.released_amount, 500);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_dispute_blocks_release_until_resolved_for_freelancer() {
    let backend = Backend::new();
    backend.open_job(42, CLIENT);
    let runtime = backend.runtime(config());
    runtime.start().await.unwrap();

    let on_approval = runtime
        .rules()
        .create_rule(rule(
            TriggerType::ApprovalConsensus,
            vec![Condition::ClientApproval],
        ))
        .await
        .unwrap();
    let on_resolution = runtime
        .rules()
        .create_rule(rule(
            TriggerType::DisputeResolution,
            vec![Condition::ClientApproval],
        ))
        .await
        .unwrap();

    backend.emit(
        "MilestoneSubmitted",
        json!({ "job_id": 42, "milestone": 0 }),
        3,
    );
    backend.emit(
        "DisputeRaised",
        json!({ "job_id": 42, "milestone": 0, "raised_by": CLIENT }),
        4,
    );
    runtime.sync().sync_to_head().await.unwrap();
    assert_eq!(backend.jobs.snapshot(42).unwrap().status, JobStatus::Disputed);
    assert_eq!(
        backend.jobs.snapshot(42).unwrap().milestones[0].status,
        MilestoneStatus::Disputed
    );

    backend.emit(
        "DisputeResolved",
        json!({ "job_id": 42, "milestone": 0, "in_favor_of_freelancer": true }),
        5,
    );
    runtime.sync().sync_to_head().await.unwrap();

    let releases = backend.settlement.releases();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].amount, 500);
    assert_eq!(
        runtime.rules().get_rule(on_resolution.id).await.unwrap().status,
        RuleStatus::Executed
    );
    // Never triggered: approval came from the resolution, not the client.
    assert_eq!(
        runtime.rules().get_rule(on_approval.id).await.unwrap().status,
        RuleStatus::Pending
    );

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_disputed_job_defers_rule_with_reason() {
    let backend = Backend::new();
    backend.open_job(42, CLIENT);
    let runtime = backend.runtime(config());
    runtime.start().await.unwrap();

    let created = runtime
        .rules()
        .create_rule(rule(TriggerType::MilestoneCompletion, vec![]))
        .await
        .unwrap();

    backend.emit(
        "DisputeRaised",
        json!({ "job_id": 42, "milestone": null, "raised_by": CLIENT }),
        3,
    );
    backend.emit(
        "MilestoneSubmitted",
        json!({ "job_id": 42, "milestone": 0 }),
        4,
    );
    runtime.sync().sync_to_head().await.unwrap();

    assert!(backend.settlement.releases().is_empty());
    let deferred = runtime.rules().get_rule(created.id).await.unwrap();
    assert_eq!(deferred.status, RuleStatus::Pending);
    assert!(deferred.last_error.is_some());

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_resolution_against_freelancer_releases_nothing() {
    let backend = Backend::new();
    backend.open_job(42, CLIENT);
    let runtime = backend.runtime(config());
    runtime.start().await.unwrap();

    runtime
        .rules()
        .create_rule(rule(
            TriggerType::DisputeResolution,
            vec![Condition::ClientApproval],
        ))
        .await
        .unwrap();

    backend.emit(
        "MilestoneSubmitted",
        json!({ "job_id": 42, "milestone": 0 }),
        3,
    );
    backend.emit(
        "DisputeRaised",
        json!({ "job_id": 42, "milestone": 0, "raised_by": CLIENT }),
        4,
    );
    backend.emit(
        "DisputeResolved",
        json!({ "job_id": 42, "milestone": 0, "in_favor_of_freelancer": false }),
        5,
    );
    runtime.sync().sync_to_head().await.unwrap();

    assert!(backend.settlement.releases().is_empty());
    let job = backend.jobs.snapshot(42).unwrap();
    assert_eq!(job.status, JobStatus::Active);
    assert_eq!(job.milestones[0].status, MilestoneStatus::Pending);

    runtime.shutdown().await;
}
