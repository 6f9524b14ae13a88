//! Ports module for the Chain Event Synchronizer

pub mod inbound;
pub mod outbound;

pub use inbound::{ChainSyncApi, ReprocessReport};
pub use outbound::{ChainLogSource, MockChainLogSource, ParsedLog, RawLog};
