//! # es-03-authorization-quorum
//!
//! Authorization Quorum Manager: collects M-of-N approvals before a
//! high-risk fund movement is dispatched to the settlement interface.
//!
//! ## Lifecycle
//!
//! A proposal opens with its proposer as the first signer. Each further
//! signature is an ECDSA signature over the proposal's canonical digest and
//! must recover to the address that submits it. The signature that reaches
//! `required_signatures` moves the proposal to `ready_for_execution`;
//! `execute` then dispatches the settlement call. A failed call leaves the
//! proposal ready so it can be executed again.
//!
//! ## Authorized Owners
//!
//! With [`QuorumConfig::authorized_signers`] set, proposers, signers and
//! non-signing executors must be in the set. With it empty, any address that
//! proves its identity through signature recovery may sign.
//!
//! ## Example
//!
//! ```rust,ignore
//! use es_03_authorization_quorum::{ProposalRequest, QuorumApi, QuorumService};
//!
//! let proposal = quorum.propose(request).await?;
//! let digest = quorum.digest(proposal.id).await?;
//! // signer produces `signature` over `digest` off-line
//! quorum.sign(proposal.id, signer, signature).await?;
//! quorum.execute(proposal.id, signer).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::ProposalRepository;
pub use config::QuorumConfig;
pub use domain::{
    MultiSigProposal, ProposalFilter, ProposalStatus, ProposalType, QuorumError, QuorumResult,
    Signature, SignatureError,
};
pub use ports::{ProposalRequest, QuorumApi};
pub use service::{QuorumPorts, QuorumService};

#[cfg(any(test, feature = "test-helpers"))]
pub use domain::signature::test_helpers;
