//! # Adapters Layer
//!
//! Rule and scheduled-payment persistence.

mod repository;

pub use repository::RuleRepository;
