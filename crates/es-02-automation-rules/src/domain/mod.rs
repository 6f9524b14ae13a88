//! # Domain Layer
//!
//! Rules, conditions, scheduled payments and errors.

pub mod condition;
pub mod errors;
pub mod rule;
pub mod schedule;

pub use condition::{Condition, ConditionContext};
pub use errors::{RuleEngineError, RuleEngineResult};
pub use rule::{
    ActionParameters, ActionType, AutomationRule, ExecutionRef, RuleSchedule, RuleSpec,
    RuleStatus, RuleTrigger,
};
pub use schedule::{PaymentStatus, ScheduleEntry, ScheduleIndex, ScheduledPayment};
