//! Ports module for the Authorization Quorum Manager
//!
//! Outbound needs (durable store, settlement gateway, job-event sink, clock)
//! are the shared ports from `shared-types`.

pub mod inbound;

pub use inbound::{ProposalRequest, QuorumApi};
