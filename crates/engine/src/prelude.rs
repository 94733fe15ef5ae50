//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use clmm_keeper_engine::prelude::*;
//! ```

// Assembly
pub use crate::assembler::{
    BoundedTransaction, MAX_COMPUTE_UNITS, MAX_TRANSACTION_BYTES, assemble, priority_fee_lamports,
};

// Configuration and context
pub use crate::config::EngineConfig;
pub use crate::context::EngineContext;

// Decoding
pub use crate::decode::{DecodedInstruction, TransientAccount, TransientAccountRegistry};
pub use crate::raw::{RawInstruction, RawTransaction, RpcFetcher, TransactionFetcher};

// Errors and retry
pub use crate::error::EngineError;
pub use crate::retry::{RetryPolicy, backoff_delay, execute};

// Oracles
pub use crate::oracle::{FeeSampler, RpcFeeSampler, estimate_priority_fee, token_price};

// Execution and settlement
pub use crate::runner::{ExecutionOutcome, run_and_settle};
pub use crate::settle::{SettlementSummary, summarize};
pub use crate::submit::{
    RpcSubmitter, SignatureStatusView, SubmissionResult, SubmissionRpc, submit_and_confirm,
};
