//! # es-02-automation-rules
//!
//! Automation Rule Engine: releases milestone payments when a rule's trigger
//! fires and all of its conditions hold.
//!
//! ## Rules
//!
//! A rule binds one trigger (`milestone_completion`, `time_based`,
//! `approval_consensus`, `dispute_resolution`) to a list of conditions and a
//! single action. Conditions are AND-ed; an empty list fires unconditionally.
//! A rule fires at most once until it is reset.
//!
//! ## Evaluation Paths
//!
//! - **Event-driven**: [`RuleEngineApi::on_event`], fed by the chain
//!   synchronizer through [`shared_types::TransitionListener`]
//! - **Scheduled**: [`RuleEngineApi::tick`], driven by one periodic scheduler
//!   over an in-memory due-time index
//!
//! Both paths take the same per-rule lock, so a rule racing between them is
//! executed once.
//!
//! ## Pre-flight
//!
//! Before money moves the job must accept settlement, the milestone must be
//! completed but unpaid, and the escrow must hold the amount. A failed check
//! leaves the rule pending with the reason recorded.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::RuleRepository;
pub use config::RuleEngineConfig;
pub use domain::{
    ActionParameters, ActionType, AutomationRule, Condition, ConditionContext, ExecutionRef,
    PaymentStatus, RuleEngineError, RuleEngineResult, RuleSchedule, RuleSpec, RuleStatus,
    RuleTrigger, ScheduledPayment,
};
pub use ports::{
    MockOracleVerifier, MockQuorumGateway, MultisigRequest, OracleVerifier, PaymentRequest,
    QuorumGateway, RuleEngineApi, RuleOutcome, TickReport,
};
pub use service::{RuleEngineService, RuleEnginePorts};
