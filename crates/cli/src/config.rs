//! Environment-driven keeper configuration.

use anyhow::{Context, Result};
use clmm_keeper_engine::config::EngineConfig;
use solana_commitment_config::CommitmentConfig;
use std::env;
use std::time::Duration;

/// Everything the keeper binary needs to start.
pub struct KeeperConfig {
    pub rpc_url: String,
    pub keypair_path: String,
    /// Settlement history persistence; disabled when unset.
    pub database_url: Option<String>,
    pub engine: EngineConfig,
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw
                .parse()
                .with_context(|| format!("{name} must be an integer, got {raw:?}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

impl KeeperConfig {
    /// Loads configuration from the environment (after `dotenv`).
    ///
    /// # Errors
    /// Returns an error when a required variable is missing or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var("SOLANA_RPC_URL")
            .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());
        let keypair_path =
            env::var("KEEPER_KEYPAIR").context("KEEPER_KEYPAIR must point to a keypair file")?;

        let mut engine = EngineConfig {
            fee_oracle_url: env::var("FEE_ORACLE_URL").ok(),
            price_api_key: env::var("BIRDEYE_API_KEY").ok(),
            ..EngineConfig::default()
        };
        if let Ok(url) = env::var("PRICE_ORACLE_URL") {
            engine.price_oracle_url = url;
        }
        if let Some(min) = env_u64("MIN_PRIORITY_FEE")? {
            engine.min_priority_fee = min;
        }
        if let Some(max) = env_u64("MAX_PRIORITY_FEE")? {
            engine.max_priority_fee = max;
        }
        if let Some(secs) = env_u64("CONFIRM_TIMEOUT_SECS")? {
            engine.confirm_timeout = Duration::from_secs(secs);
        }
        if let Ok(level) = env::var("COMMITMENT") {
            engine.commitment = match level.as_str() {
                "processed" => CommitmentConfig::processed(),
                "confirmed" => CommitmentConfig::confirmed(),
                _ => CommitmentConfig::finalized(),
            };
        }

        Ok(Self {
            rpc_url,
            keypair_path,
            database_url: env::var("DATABASE_URL").ok(),
            engine,
        })
    }
}
