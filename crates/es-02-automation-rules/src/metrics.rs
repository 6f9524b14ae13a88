//! # Rule Engine Metrics
//!
//! - `automation_rules_executed_total` - Counter of executed rules (by action)
//! - `automation_preflight_failures_total` - Counter of deferred executions
//! - `automation_payments_executed_total` - Counter of executed scheduled payments

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref RULES_EXECUTED: IntCounterVec = register_int_counter_vec!(
        "automation_rules_executed_total",
        "Total rules whose action was dispatched",
        &["action"]
    )
    .expect("Failed to create RULES_EXECUTED metric");

    pub static ref PREFLIGHT_FAILURES: IntCounter = register_int_counter!(
        "automation_preflight_failures_total",
        "Total executions deferred by a failed pre-flight check"
    )
    .expect("Failed to create PREFLIGHT_FAILURES metric");

    pub static ref PAYMENTS_EXECUTED: IntCounter = register_int_counter!(
        "automation_payments_executed_total",
        "Total scheduled payments released"
    )
    .expect("Failed to create PAYMENTS_EXECUTED metric");
}

#[cfg(feature = "metrics")]
pub fn record_rule_executed(action: &str) {
    RULES_EXECUTED.with_label_values(&[action]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_preflight_failure() {
    PREFLIGHT_FAILURES.inc();
}

#[cfg(feature = "metrics")]
pub fn record_payment_executed() {
    PAYMENTS_EXECUTED.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_rule_executed(_action: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_preflight_failure() {}

#[cfg(not(feature = "metrics"))]
pub fn record_payment_executed() {}
