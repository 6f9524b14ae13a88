//! # Adapters Layer
//!
//! Proposal persistence.

mod repository;

pub use repository::ProposalRepository;
