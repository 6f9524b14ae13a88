//! # Automation Rules
//!
//! A rule has exactly one trigger, zero or more conditions and one action.
//! Its status gates execution: only an active `pending` rule is evaluated,
//! and it fires at most once until it is explicitly reset.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, JobId, MilestoneIndex, Timestamp, TriggerType, TxHash};
use uuid::Uuid;

use super::condition::Condition;
use super::errors::{RuleEngineError, RuleEngineResult};

/// Lifecycle of a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Pending,
    Executed,
    Error,
}

/// What a rule does once every condition holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Call the settlement interface directly.
    ReleasePayment,
    /// Open a multi-signature proposal for the release.
    RequestMultisig,
}

impl ActionType {
    pub const NAMES: [&'static str; 2] = ["release_payment", "request_multisig"];
}

/// Optional schedule of a time-based trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSchedule {
    /// Earliest time the rule may fire.
    pub not_before: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub schedule: Option<RuleSchedule>,
}

/// Action parameters. Unset fields fall back to job state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParameters {
    /// Defaults to the milestone amount.
    #[serde(default, with = "shared_types::amount::decimal_option")]
    pub amount: Option<Amount>,
    /// Defaults to the job's freelancer.
    #[serde(default)]
    pub recipient: Option<Address>,
    /// `request_multisig` only.
    #[serde(default)]
    pub proposer: Option<Address>,
    /// `request_multisig` only.
    #[serde(default)]
    pub required_signatures: Option<u32>,
    /// `request_multisig` only. Defaults to the quorum manager's TTL.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// What an executed rule produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionRef {
    Settlement { tx_hash: TxHash },
    Proposal { proposal_id: Uuid },
}

/// Registration request for a rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub job_id: JobId,
    #[serde(default)]
    pub milestone: Option<MilestoneIndex>,
    pub trigger: RuleTrigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub action: ActionType,
    #[serde(default)]
    pub parameters: ActionParameters,
    #[serde(default)]
    pub priority: i32,
}

impl RuleSpec {
    /// Parse an externally supplied JSON spec, naming the offending enum
    /// value when one is out of range.
    pub fn from_json(json: &str) -> RuleEngineResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| RuleEngineError::InvalidRule(e.to_string()))?;

        if let Some(trigger) = value.pointer("/trigger/type").and_then(|t| t.as_str()) {
            if serde_json::from_value::<TriggerType>(serde_json::Value::from(trigger)).is_err() {
                return Err(RuleEngineError::UnknownTrigger(trigger.to_string()));
            }
        }
        if let Some(action) = value.get("action").and_then(|a| a.as_str()) {
            if !ActionType::NAMES.contains(&action) {
                return Err(RuleEngineError::UnknownAction(action.to_string()));
            }
        }
        if let Some(conditions) = value.get("conditions").and_then(|c| c.as_array()) {
            for kind in conditions
                .iter()
                .filter_map(|c| c.get("type").and_then(|t| t.as_str()))
            {
                if !Condition::KINDS.contains(&kind) {
                    return Err(RuleEngineError::UnknownCondition(kind.to_string()));
                }
            }
        }

        serde_json::from_value(value).map_err(|e| RuleEngineError::InvalidRule(e.to_string()))
    }

    /// Structural checks that need no job state.
    pub fn validate(&self) -> RuleEngineResult<()> {
        if self.milestone.is_none() {
            return Err(RuleEngineError::InvalidRule(
                "settlement actions require a milestone".into(),
            ));
        }
        if self.trigger.trigger_type == TriggerType::TimeBased && self.trigger.schedule.is_none() {
            return Err(RuleEngineError::InvalidRule(
                "time_based trigger requires a schedule".into(),
            ));
        }
        if self.parameters.amount == Some(0) {
            return Err(RuleEngineError::InvalidRule("amount must be > 0".into()));
        }
        if self.action == ActionType::RequestMultisig {
            if self.parameters.proposer.is_none() {
                return Err(RuleEngineError::InvalidRule(
                    "request_multisig requires a proposer".into(),
                ));
            }
            if self.parameters.required_signatures.unwrap_or(0) == 0 {
                return Err(RuleEngineError::InvalidRule(
                    "request_multisig requires required_signatures > 0".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A registered automation rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub job_id: JobId,
    pub milestone: Option<MilestoneIndex>,
    pub trigger: RuleTrigger,
    pub conditions: Vec<Condition>,
    pub action: ActionType,
    pub parameters: ActionParameters,
    /// Higher fires first when several rules match one event.
    pub priority: i32,
    pub is_active: bool,
    pub status: RuleStatus,
    /// Evaluations performed since the last reset.
    pub trigger_count: u32,
    pub last_triggered: Option<Timestamp>,
    pub last_error: Option<String>,
    pub execution: Option<ExecutionRef>,
    pub created_at: Timestamp,
}

impl AutomationRule {
    pub fn from_spec(spec: RuleSpec, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: spec.job_id,
            milestone: spec.milestone,
            trigger: spec.trigger,
            conditions: spec.conditions,
            action: spec.action,
            parameters: spec.parameters,
            priority: spec.priority,
            is_active: true,
            status: RuleStatus::Pending,
            trigger_count: 0,
            last_triggered: None,
            last_error: None,
            execution: None,
            created_at: now,
        }
    }

    /// Active and not yet fired.
    pub fn is_armed(&self) -> bool {
        self.is_active && self.status == RuleStatus::Pending
    }

    /// Whether an occurrence makes this rule eligible.
    pub fn matches(
        &self,
        job_id: JobId,
        milestone: Option<MilestoneIndex>,
        trigger: TriggerType,
    ) -> bool {
        self.job_id == job_id
            && self.trigger.trigger_type == trigger
            && match (self.milestone, milestone) {
                (Some(own), Some(event)) => own == event,
                _ => true,
            }
    }

    /// Time at which a time-based rule becomes due.
    pub fn due_at(&self) -> Option<Timestamp> {
        match self.trigger.trigger_type {
            TriggerType::TimeBased => self.trigger.schedule.map(|s| s.not_before),
            _ => None,
        }
    }

    /// Clear execution state so the rule can fire again.
    pub fn reset(&mut self) {
        self.is_active = true;
        self.status = RuleStatus::Pending;
        self.trigger_count = 0;
        self.last_error = None;
        self.execution = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_json(trigger: &str, condition: &str, action: &str) -> String {
        format!(
            r#"{{
                "job_id": 42,
                "milestone": 0,
                "trigger": {{"type": "{trigger}"}},
                "conditions": [{{"type": "{condition}"}}],
                "action": "{action}"
            }}"#
        )
    }

    #[test]
    fn test_from_json_valid() {
        let spec = RuleSpec::from_json(&spec_json(
            "milestone_completion",
            "client_approval",
            "release_payment",
        ))
        .unwrap();
        assert_eq!(spec.job_id, 42);
        assert_eq!(spec.trigger.trigger_type, TriggerType::MilestoneCompletion);
        assert_eq!(spec.conditions, vec![Condition::ClientApproval]);
        assert_eq!(spec.priority, 0);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_from_json_unknown_enums() {
        assert!(matches!(
            RuleSpec::from_json(&spec_json("whenever", "client_approval", "release_payment")),
            Err(RuleEngineError::UnknownTrigger(t)) if t == "whenever"
        ));
        assert!(matches!(
            RuleSpec::from_json(&spec_json("milestone_completion", "vibes", "release_payment")),
            Err(RuleEngineError::UnknownCondition(_))
        ));
        assert!(matches!(
            RuleSpec::from_json(&spec_json("milestone_completion", "client_approval", "burn")),
            Err(RuleEngineError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_time_based_requires_schedule() {
        let mut spec = RuleSpec::from_json(&spec_json(
            "time_based",
            "deliverable_submitted",
            "release_payment",
        ))
        .unwrap();
        assert!(spec.validate().is_err());
        spec.trigger.schedule = Some(RuleSchedule { not_before: 10 });
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_multisig_requires_quorum_parameters() {
        let mut spec = RuleSpec::from_json(&spec_json(
            "approval_consensus",
            "client_approval",
            "request_multisig",
        ))
        .unwrap();
        assert!(spec.validate().is_err());
        spec.parameters.proposer = Some([3; 20]);
        spec.parameters.required_signatures = Some(2);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_matching_and_reset() {
        let spec = RuleSpec::from_json(&spec_json(
            "milestone_completion",
            "client_approval",
            "release_payment",
        ))
        .unwrap();
        let mut rule = AutomationRule::from_spec(spec, 5);
        assert!(rule.matches(42, Some(0), TriggerType::MilestoneCompletion));
        assert!(rule.matches(42, None, TriggerType::MilestoneCompletion));
        assert!(!rule.matches(42, Some(1), TriggerType::MilestoneCompletion));
        assert!(!rule.matches(42, Some(0), TriggerType::DisputeResolution));
        assert!(!rule.matches(7, Some(0), TriggerType::MilestoneCompletion));

        rule.status = RuleStatus::Executed;
        rule.trigger_count = 3;
        assert!(!rule.is_armed());
        rule.reset();
        assert!(rule.is_armed());
        assert_eq!(rule.trigger_count, 0);
    }
}
