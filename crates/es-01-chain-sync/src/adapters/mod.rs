//! # Adapters Layer
//!
//! Persistence of the audit trail and cursor.

mod repository;

pub use repository::EventRepository;
