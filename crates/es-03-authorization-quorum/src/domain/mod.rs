//! # Domain Layer
//!
//! Proposal state machine, canonical digest and signer recovery.

pub mod errors;
pub mod proposal;
pub mod signature;

pub use errors::{QuorumError, QuorumResult, SignatureError};
pub use proposal::{MultiSigProposal, ProposalFilter, ProposalStatus, ProposalType};
pub use signature::{address_from_pubkey, keccak256, recover_signer, verify_signer, Signature};
