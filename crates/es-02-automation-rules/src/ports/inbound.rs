//! Driving Ports (API - Inbound)

use async_trait::async_trait;
use shared_types::{Address, Amount, JobId, MilestoneIndex, Timestamp, TriggerType};
use uuid::Uuid;

use crate::domain::{
    AutomationRule, Condition, ExecutionRef, RuleEngineResult, RuleSpec, ScheduledPayment,
};

/// Result of evaluating one rule or scheduled payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Action dispatched.
    Executed(ExecutionRef),
    /// At least one condition is false; the listed kinds were unmet.
    ConditionsUnmet(Vec<&'static str>),
    /// Pre-flight check or transient dispatch failure; retried later.
    Deferred(String),
    /// Dispatch failed permanently; the rule is in `error`.
    Failed(String),
    /// Not evaluated (already executed, inactive, milestone gone).
    Skipped(String),
}

impl RuleOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, RuleOutcome::Executed(_))
    }
}

/// Summary of one scheduler pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rules_evaluated: usize,
    pub rules_executed: usize,
    pub payments_evaluated: usize,
    pub payments_executed: usize,
}

/// Request to schedule a one-shot payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    pub job_id: JobId,
    pub milestone: MilestoneIndex,
    pub release_date: Timestamp,
    pub conditions: Vec<Condition>,
    pub amount: Option<Amount>,
    pub recipient: Option<Address>,
}

/// Primary rule engine API.
#[async_trait]
pub trait RuleEngineApi: Send + Sync {
    async fn create_rule(&self, spec: RuleSpec) -> RuleEngineResult<AutomationRule>;

    async fn create_rule_from_json(&self, json: &str) -> RuleEngineResult<AutomationRule>;

    async fn get_rule(&self, rule_id: Uuid) -> RuleEngineResult<AutomationRule>;

    /// Every rule registered for a job, highest priority first.
    async fn get_rule_status(&self, job_id: JobId) -> RuleEngineResult<Vec<AutomationRule>>;

    async fn deactivate_rule(&self, rule_id: Uuid) -> RuleEngineResult<AutomationRule>;

    /// Re-arm a rule so it may fire again.
    async fn reset_rule(&self, rule_id: Uuid) -> RuleEngineResult<AutomationRule>;

    /// Evaluate every armed rule matching the occurrence.
    async fn on_event(
        &self,
        job_id: JobId,
        milestone: Option<MilestoneIndex>,
        trigger: TriggerType,
    ) -> RuleEngineResult<Vec<(Uuid, RuleOutcome)>>;

    /// Evaluate due time-based rules and scheduled payments.
    async fn tick(&self, now: Timestamp) -> RuleEngineResult<TickReport>;

    async fn schedule_payment(&self, request: PaymentRequest) -> RuleEngineResult<ScheduledPayment>;

    async fn cancel_scheduled_payment(&self, payment_id: Uuid)
        -> RuleEngineResult<ScheduledPayment>;

    async fn scheduled_payments(&self, job_id: JobId) -> RuleEngineResult<Vec<ScheduledPayment>>;

    /// Rebuild the schedule index from the store. Returns the entry count.
    async fn load(&self) -> RuleEngineResult<usize>;
}
