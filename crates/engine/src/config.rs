//! Engine configuration.
//!
//! Constructed once by the binary from its environment and passed into
//! [`crate::context::EngineContext`]; the engine itself never reads the
//! environment.

use solana_commitment_config::CommitmentConfig;
use std::time::Duration;

/// Tunables for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Primary priority-fee estimator endpoint; `None` disables the
    /// primary and goes straight to the on-chain fallback.
    pub fee_oracle_url: Option<String>,
    /// Fiat price API base URL.
    pub price_oracle_url: String,
    /// API key for the price API, if it requires one.
    pub price_api_key: Option<String>,
    /// Lower clamp for the priority fee, micro-lamports per CU.
    pub min_priority_fee: u64,
    /// Upper clamp for the priority fee, micro-lamports per CU.
    pub max_priority_fee: u64,
    /// Commitment a transaction must reach to be treated as settled.
    pub commitment: CommitmentConfig,
    /// Deadline for one send-and-confirm attempt.
    pub confirm_timeout: Duration,
    /// Interval between signature status polls.
    pub confirm_poll_interval: Duration,
    /// Compute-unit limit used when no override or estimate is available.
    pub default_compute_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fee_oracle_url: None,
            price_oracle_url: "https://public-api.birdeye.so".to_string(),
            price_api_key: None,
            min_priority_fee: 1_000,
            max_priority_fee: 2_000_000,
            commitment: CommitmentConfig::finalized(),
            confirm_timeout: Duration::from_secs(60),
            confirm_poll_interval: Duration::from_millis(500),
            default_compute_limit: 200_000,
        }
    }
}
