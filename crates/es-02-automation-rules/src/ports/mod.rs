//! Ports module for the Automation Rule Engine

pub mod inbound;
pub mod outbound;

pub use inbound::{PaymentRequest, RuleEngineApi, RuleOutcome, TickReport};
pub use outbound::{
    MockOracleVerifier, MockQuorumGateway, MultisigRequest, OracleVerifier, QuorumGateway,
};
