//! Transaction execution and settlement engine.
//!
//! This crate owns the full lifecycle of a keeper transaction:
//! - Backoff-retry execution for every flaky call
//! - Priority-fee and token-price oracles with fallbacks
//! - Assembly into bounded, fee-primed transactions
//! - Submission with fresh-blockhash re-signing and confirmation
//! - Trace decoding and settlement into signed per-mint deltas

/// Prelude module for convenient imports.
pub mod prelude;

/// Transaction assembly and budget bounds.
pub mod assembler;
/// Engine configuration.
pub mod config;
/// Shared clients and memo caches.
pub mod context;
/// Trace decoding and the transient account registry.
pub mod decode;
/// Error taxonomy.
pub mod error;
/// Fee and price oracles.
pub mod oracle;
/// Raw transaction view and fetch seam.
pub mod raw;
/// Backoff-retry executor.
pub mod retry;
/// End-to-end execution facade.
pub mod runner;
/// Settlement accounting.
pub mod settle;
/// Submission and confirmation.
pub mod submit;
