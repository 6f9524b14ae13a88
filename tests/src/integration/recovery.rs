//! # Restart From Durable State
//!
//! A second runtime over the same durable store must resume from the
//! committed cursor, rebuild the schedule index and keep every rule's
//! fire-once guarantee.

use std::time::Duration;

use es_01_chain_sync::{ChainSyncApi, CursorOrigin};
use es_02_automation_rules::{
    ActionParameters, ActionType, Condition, PaymentRequest, PaymentStatus, RuleEngineApi,
    RuleSchedule, RuleSpec, RuleStatus, RuleTrigger,
};
use serde_json::json;
use shared_types::{MilestoneStatus, TimeSource, TriggerType};

use super::harness::{config, Backend, START};

const CLIENT: [u8; 20] = [0x11; 20];

#[tokio::test]
async fn test_restart_resumes_cursor_and_schedule() {
    let backend = Backend::new();
    backend.open_job(42, CLIENT);
    backend.emit(
        "MilestoneSubmitted",
        json!({ "job_id": 42, "milestone": 0 }),
        3,
    );

    let first = backend.runtime(config());
    first.start().await.unwrap();

    let timed = first
        .rules()
        .create_rule(RuleSpec {
            job_id: 42,
            milestone: Some(0),
            trigger: RuleTrigger {
                trigger_type: TriggerType::TimeBased,
                schedule: Some(RuleSchedule {
                    not_before: START + 3_600,
                }),
            },
            conditions: vec![Condition::DeliverableSubmitted],
            action: ActionType::ReleasePayment,
            parameters: ActionParameters::default(),
            priority: 0,
        })
        .await
        .unwrap();
    let payment = first
        .rules()
        .schedule_payment(PaymentRequest {
            job_id: 42,
            milestone: 1,
            release_date: START + 7_200,
            conditions: vec![Condition::DeliverableSubmitted],
            amount: None,
            recipient: None,
        })
        .await
        .unwrap();
    assert_eq!(first.status().await.scheduled_entries, 2);

    first.shutdown().await;
    drop(first);

    // Logs keep arriving while the process is down.
    backend.emit(
        "MilestoneSubmitted",
        json!({ "job_id": 42, "milestone": 1 }),
        4,
    );

    let second = backend.runtime(config());
    second.start().await.unwrap();
    let status = second.status().await;
    assert_eq!(status.sync.cursor_origin, Some(CursorOrigin::Durable));
    assert_eq!(status.sync.cursor, Some(4));
    assert_eq!(status.scheduled_entries, 2);

    // Only the new log was applied.
    assert_eq!(backend.count("job_created"), 1);
    assert_eq!(backend.count("milestone_submitted"), 2);
    assert_eq!(
        backend.jobs.snapshot(42).unwrap().milestones[1].status,
        MilestoneStatus::Submitted
    );

    second.shutdown().await;
    backend.clock.advance(Duration::from_secs(7_200));
    assert_eq!(backend.clock.now(), START + 7_200);

    let (report, _) = second.run_scheduled_pass().await;
    let report = report.unwrap();
    assert_eq!(report.rules_executed, 1);
    assert_eq!(report.payments_executed, 1);

    let amounts: Vec<_> = backend
        .settlement
        .releases()
        .iter()
        .map(|r| r.amount)
        .collect();
    assert_eq!(amounts.len(), 2);
    assert!(amounts.contains(&500));
    assert!(amounts.contains(&300));

    assert_eq!(
        second.rules().get_rule(timed.id).await.unwrap().status,
        RuleStatus::Executed
    );
    let payments = second.rules().scheduled_payments(42).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].id, payment.id);
    assert_eq!(payments[0].status, PaymentStatus::Executed);

    // A third process finds nothing left to do.
    let third = backend.runtime(config());
    third.start().await.unwrap();
    third.shutdown().await;
    let (report, _) = third.run_scheduled_pass().await;
    assert_eq!(report.unwrap().rules_executed, 0);
    assert_eq!(backend.settlement.releases().len(), 2);
    assert_eq!(third.status().await.scheduled_entries, 0);
}

#[tokio::test]
async fn test_executed_rule_does_not_refire_after_restart() {
    let backend = Backend::new();
    backend.open_job(42, CLIENT);

    let first = backend.runtime(config());
    first.start().await.unwrap();
    first
        .rules()
        .create_rule(RuleSpec {
            job_id: 42,
            milestone: Some(0),
            trigger: RuleTrigger {
                trigger_type: TriggerType::MilestoneCompletion,
                schedule: None,
            },
            conditions: vec![],
            action: ActionType::ReleasePayment,
            parameters: ActionParameters::default(),
            priority: 0,
        })
        .await
        .unwrap();
    backend.emit(
        "MilestoneSubmitted",
        json!({ "job_id": 42, "milestone": 0 }),
        3,
    );
    first.sync().sync_to_head().await.unwrap();
    assert_eq!(backend.settlement.releases().len(), 1);
    first.shutdown().await;
    drop(first);

    // Operator rewinds the cursor on the new process.
    let second = backend.runtime(config());
    second.start().await.unwrap();
    second.sync().force_resync(1).await.unwrap();
    second.sync().sync_to_head().await.unwrap();
    backend.emit(
        "MilestoneApproved",
        json!({ "job_id": 42, "milestone": 0 }),
        4,
    );
    second.sync().sync_to_head().await.unwrap();

    assert_eq!(backend.settlement.releases().len(), 1);
    second.shutdown().await;
}
