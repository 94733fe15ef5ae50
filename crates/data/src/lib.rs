//! Persistence layer for settlement history.
//!
//! This crate provides repository patterns for storing and querying
//! settled transaction summaries in PostgreSQL.

/// Repository implementations.
pub mod repositories;

pub use repositories::{Database, SettlementRecord, SettlementRepository};
