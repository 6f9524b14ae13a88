//! # Quorum Metrics
//!
//! Prometheus metrics for the Authorization Quorum Manager, behind the
//! `metrics` feature.
//!
//! - `quorum_proposals_created_total` - Counter of proposals opened
//! - `quorum_signatures_accepted_total` - Counter of signatures appended
//! - `quorum_signatures_rejected_total` - Counter of refused signatures (by reason)
//! - `quorum_proposals_finalized_total` - Counter of terminal transitions (by status)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref PROPOSALS_CREATED: IntCounter = register_int_counter!(
        "quorum_proposals_created_total",
        "Total proposals opened"
    )
    .expect("Failed to create PROPOSALS_CREATED metric");

    pub static ref SIGNATURES_ACCEPTED: IntCounter = register_int_counter!(
        "quorum_signatures_accepted_total",
        "Total signatures appended to proposals"
    )
    .expect("Failed to create SIGNATURES_ACCEPTED metric");

    pub static ref SIGNATURES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "quorum_signatures_rejected_total",
        "Total signatures refused",
        &["reason"]
    )
    .expect("Failed to create SIGNATURES_REJECTED metric");

    pub static ref PROPOSALS_FINALIZED: IntCounterVec = register_int_counter_vec!(
        "quorum_proposals_finalized_total",
        "Total proposals reaching a terminal status",
        &["status"]
    )
    .expect("Failed to create PROPOSALS_FINALIZED metric");
}

#[cfg(feature = "metrics")]
pub fn record_proposal_created() {
    PROPOSALS_CREATED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_signature_accepted() {
    SIGNATURES_ACCEPTED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_signature_rejected(reason: &str) {
    SIGNATURES_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_finalized(status: &str) {
    PROPOSALS_FINALIZED.with_label_values(&[status]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_proposal_created() {}

#[cfg(not(feature = "metrics"))]
pub fn record_signature_accepted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_signature_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_finalized(_status: &str) {}
