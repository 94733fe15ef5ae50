//! Typed error taxonomy for the execution engine.
//!
//! Retryable conditions (`Network`, `BlockhashExpired`, and program
//! errors a call site names) are resolved inside the engine; everything
//! that surfaces to a caller is either a success or a fatal error
//! carrying enough structure to decide what to do next.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use thiserror::Error;

/// Errors produced by the execution and settlement engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transient transport/RPC failure; always retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The transaction's blockhash is no longer valid; retryable with a
    /// refreshed blockhash.
    #[error("blockhash expired before confirmation")]
    BlockhashExpired,

    /// An on-chain program rejected the transaction. Retryable only if
    /// the caller's policy names `name`.
    #[error("program {program} failed: {name} ({code}): {message}")]
    Program {
        program: Pubkey,
        code: u32,
        name: String,
        message: String,
    },

    /// The assembled transaction exceeds the network packet size.
    /// Fatal: the caller must split the instruction set.
    #[error("transaction is {bytes} bytes, exceeds network limit of {limit}")]
    OversizedTransaction { bytes: usize, limit: usize },

    /// The requested compute budget exceeds the per-transaction maximum.
    #[error("requested {requested} compute units, exceeds network limit of {limit}")]
    ComputeBudgetExceeded { requested: u32, limit: u32 },

    /// A fetched transaction is missing inner-instruction meta.
    /// Retried at the fetch; degrades to a flagged partial summary only
    /// after retry exhaustion.
    #[error("transaction {signature} is missing inner instruction meta")]
    DecodeIncomplete { signature: Signature },

    /// Retry budget exhausted; wraps the last attempt's error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<EngineError>,
    },

    /// Anything non-retryable: malformed payloads, insufficient funds,
    /// unrecognized on-chain failures.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Builds a `Program` error, resolving the symbolic name through the
    /// target program's error table. Unknown codes become `Custom(<code>)`.
    #[must_use]
    pub fn program(program: Pubkey, code: u32) -> Self {
        match clmm_keeper_protocols::errors::lookup(&program, code) {
            Some(info) => EngineError::Program {
                program,
                code,
                name: info.name.to_string(),
                message: info.message.to_string(),
            },
            None => EngineError::Program {
                program,
                code,
                name: format!("Custom({code})"),
                message: "unrecognized program error".to_string(),
            },
        }
    }

    /// True for conditions the engine retries unconditionally.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::BlockhashExpired | EngineError::DecodeIncomplete { .. }
        )
    }

    /// Program error name, if this is a program error.
    #[must_use]
    pub fn program_error_name(&self) -> Option<&str> {
        match self {
            EngineError::Program { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Unwraps retry-exhaustion wrappers down to the underlying error.
    #[must_use]
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clmm_keeper_protocols::orca::WHIRLPOOL_PROGRAM;

    #[test]
    fn program_error_resolves_symbolic_name() {
        let err = EngineError::program(*WHIRLPOOL_PROGRAM, 6036);
        assert_eq!(err.program_error_name(), Some("InvalidTimestamp"));
    }

    #[test]
    fn unknown_code_becomes_custom() {
        let err = EngineError::program(*WHIRLPOOL_PROGRAM, 42);
        assert_eq!(err.program_error_name(), Some("Custom(42)"));
    }

    #[test]
    fn root_unwraps_nested_exhaustion() {
        let inner = EngineError::program(*WHIRLPOOL_PROGRAM, 6036);
        let wrapped = EngineError::RetriesExhausted {
            attempts: 3,
            last: Box::new(inner),
        };
        assert_eq!(wrapped.root().program_error_name(), Some("InvalidTimestamp"));
        assert_eq!(
            EngineError::BlockhashExpired.root().program_error_name(),
            None
        );
    }

    #[test]
    fn transient_classification() {
        assert!(EngineError::Network("timeout".into()).is_transient());
        assert!(EngineError::BlockhashExpired.is_transient());
        assert!(!EngineError::Fatal("bad payload".into()).is_transient());
        assert!(!EngineError::program(*WHIRLPOOL_PROGRAM, 6017).is_transient());
    }
}
