//! Priority-fee estimation.
//!
//! Tries the configured remote estimator first under a short retry
//! policy (the call sits on the latency-critical path), then falls back
//! to a percentile over the chain's recently observed prioritization
//! fees. The estimate never fails: at worst it degrades to the
//! configured floor. The result is always clamped to
//! `[min_priority_fee, max_priority_fee]`.

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::retry::{self, RetryPolicy};
use async_trait::async_trait;
use clmm_keeper_domain::Urgency;
use serde::{Deserialize, Serialize};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of recent prioritization-fee samples for the fallback path.
#[async_trait]
pub trait FeeSampler: Send + Sync {
    async fn recent_fees(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, EngineError>;
}

/// Production sampler over `getRecentPrioritizationFees`.
pub struct RpcFeeSampler {
    rpc: Arc<RpcClient>,
}

impl RpcFeeSampler {
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl FeeSampler for RpcFeeSampler {
    async fn recent_fees(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, EngineError> {
        let recent = self
            .rpc
            .get_recent_prioritization_fees(accounts)
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        Ok(recent.iter().map(|f| f.prioritization_fee).collect())
    }
}

#[derive(Serialize)]
struct PrimaryRequest {
    jsonrpc: &'static str,
    id: u8,
    method: &'static str,
    params: [PrimaryParams; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryParams {
    account_keys: Vec<String>,
    options: PrimaryOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryOptions {
    include_all_priority_fee_levels: bool,
}

#[derive(Deserialize)]
struct PrimaryResponse {
    result: PrimaryResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryResult {
    priority_fee_levels: FeeLevels,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeLevels {
    low: f64,
    medium: f64,
    high: f64,
    very_high: f64,
}

impl FeeLevels {
    fn level(&self, urgency: Urgency) -> f64 {
        match urgency {
            Urgency::Low => self.low,
            Urgency::Medium => self.medium,
            Urgency::High => self.high,
            Urgency::VeryHigh => self.very_high,
        }
    }
}

/// Percentile of recent fee samples matching the urgency level.
#[must_use]
pub fn urgency_percentile(urgency: Urgency) -> u8 {
    match urgency {
        Urgency::Low => 25,
        Urgency::Medium => 50,
        Urgency::High => 75,
        Urgency::VeryHigh => 90,
    }
}

/// Nearest-rank percentile over unordered samples.
#[must_use]
pub fn percentile(samples: &[u64], pct: u8) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let rank = (usize::from(pct.min(100)) * sorted.len()).div_ceil(100);
    Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
}

/// Clamps a fee into the configured range.
#[must_use]
pub fn clamp_fee(fee: u64, min: u64, max: u64) -> u64 {
    fee.clamp(min, max.max(min))
}

/// Estimates a priority fee in micro-lamports per compute unit for a
/// transaction touching `accounts`.
pub async fn estimate_priority_fee(
    ctx: &EngineContext,
    accounts: &[Pubkey],
    urgency: Urgency,
) -> u64 {
    let (min, max) = (ctx.config.min_priority_fee, ctx.config.max_priority_fee);

    if let Some(url) = ctx.config.fee_oracle_url.clone() {
        let policy = RetryPolicy::quick();
        let primary = retry::execute(&policy, |_| query_primary(ctx, &url, accounts, urgency)).await;
        match primary {
            Ok(fee) => {
                let clamped = clamp_fee(fee, min, max);
                debug!(fee, clamped, level = urgency.as_level(), "primary fee estimate");
                return clamped;
            }
            Err(e) => {
                warn!(error = %e, "primary fee estimator unavailable, using on-chain fallback");
            }
        }
    }

    let fallback = fallback_estimate(ctx, accounts, urgency).await;
    clamp_fee(fallback, min, max)
}

async fn query_primary(
    ctx: &EngineContext,
    url: &str,
    accounts: &[Pubkey],
    urgency: Urgency,
) -> Result<u64, EngineError> {
    let request = PrimaryRequest {
        jsonrpc: "2.0",
        id: 1,
        method: "getPriorityFeeEstimate",
        params: [PrimaryParams {
            account_keys: accounts.iter().map(Pubkey::to_string).collect(),
            options: PrimaryOptions {
                include_all_priority_fee_levels: true,
            },
        }],
    };

    let response = ctx
        .http
        .post(url)
        .json(&request)
        .send()
        .await
        .map_err(|e| EngineError::Network(e.to_string()))?;
    if !response.status().is_success() {
        return Err(EngineError::Network(format!(
            "fee estimator returned {}",
            response.status()
        )));
    }
    let body: PrimaryResponse = response
        .json()
        .await
        .map_err(|e| EngineError::Network(format!("malformed fee estimate: {e}")))?;
    Ok(body.result.priority_fee_levels.level(urgency).round() as u64)
}

/// Percentile over the chain's recent prioritization-fee samples.
async fn fallback_estimate(ctx: &EngineContext, accounts: &[Pubkey], urgency: Urgency) -> u64 {
    match ctx.fee_sampler.recent_fees(accounts).await {
        Ok(recent) => {
            let samples: Vec<u64> = recent.into_iter().filter(|f| *f > 0).collect();
            match percentile(&samples, urgency_percentile(urgency)) {
                Some(fee) => {
                    debug!(fee, samples = samples.len(), "fallback fee estimate");
                    fee
                }
                None => ctx.config.min_priority_fee,
            }
        }
        Err(e) => {
            warn!(error = %e, "prioritization fee samples unavailable, using floor");
            ctx.config.min_priority_fee
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::config::EngineConfig;
    use solana_sdk::instruction::{AccountMeta, Instruction};
    use solana_sdk::signature::Keypair;

    struct FixedSampler(Vec<u64>);

    #[async_trait]
    impl FeeSampler for FixedSampler {
        async fn recent_fees(&self, _accounts: &[Pubkey]) -> Result<Vec<u64>, EngineError> {
            Ok(self.0.clone())
        }
    }

    fn offline_ctx(config: EngineConfig, samples: Vec<u64>) -> EngineContext {
        EngineContext::new(
            Arc::new(RpcClient::new("http://127.0.0.1:1".to_string())),
            Arc::new(Keypair::new()),
            config,
        )
        .with_fee_sampler(Arc::new(FixedSampler(samples)))
    }

    #[tokio::test(start_paused = true)]
    async fn primary_outage_falls_back_to_sampled_percentile() {
        // Unreachable primary endpoint; zero samples are discarded
        // before the percentile is taken.
        let config = EngineConfig {
            fee_oracle_url: Some("http://127.0.0.1:1".to_string()),
            ..EngineConfig::default()
        };
        let ctx = offline_ctx(config, vec![0, 4_000, 6_000, 8_000, 10_000]);

        let fee = estimate_priority_fee(&ctx, &[], Urgency::Medium).await;
        assert_eq!(fee, 6_000);
    }

    #[tokio::test(start_paused = true)]
    async fn clamped_fallback_prices_the_assembled_transaction() {
        let config = EngineConfig {
            fee_oracle_url: Some("http://127.0.0.1:1".to_string()),
            max_priority_fee: 5_000,
            ..EngineConfig::default()
        };
        let ctx = offline_ctx(config, vec![9_000_000]);

        let fee = estimate_priority_fee(&ctx, &[], Urgency::High).await;
        assert_eq!(fee, 5_000);

        let payer = Pubkey::new_unique();
        let ix = Instruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![AccountMeta::new(payer, true)],
            data: vec![1, 2, 3],
        };
        let bounded = assemble(vec![ix], &payer, fee, None).unwrap();
        assert_eq!(bounded.instructions[1].data[0], 3);
        assert_eq!(&bounded.instructions[1].data[1..9], &5_000u64.to_le_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn no_usable_samples_degrade_to_the_floor() {
        let config = EngineConfig {
            fee_oracle_url: Some("http://127.0.0.1:1".to_string()),
            ..EngineConfig::default()
        };
        let ctx = offline_ctx(config, vec![0, 0]);

        let fee = estimate_priority_fee(&ctx, &[], Urgency::VeryHigh).await;
        assert_eq!(fee, ctx.config.min_priority_fee);
    }

    #[test]
    fn percentile_nearest_rank() {
        let samples = vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000];
        assert_eq!(percentile(&samples, 50), Some(500));
        assert_eq!(percentile(&samples, 75), Some(800));
        assert_eq!(percentile(&samples, 90), Some(900));
        assert_eq!(percentile(&samples, 100), Some(1000));
        assert_eq!(percentile(&[], 50), None);
    }

    #[test]
    fn percentile_is_order_independent() {
        let shuffled = vec![900, 100, 500, 300, 700];
        assert_eq!(percentile(&shuffled, 50), Some(500));
    }

    #[test]
    fn clamp_respects_bounds() {
        assert_eq!(clamp_fee(50, 100, 1_000), 100);
        assert_eq!(clamp_fee(5_000, 100, 1_000), 1_000);
        assert_eq!(clamp_fee(500, 100, 1_000), 500);
        // Degenerate config: max below min resolves to min.
        assert_eq!(clamp_fee(500, 1_000, 10), 1_000);
    }

    #[test]
    fn urgency_maps_to_increasing_percentiles() {
        assert!(urgency_percentile(Urgency::Low) < urgency_percentile(Urgency::Medium));
        assert!(urgency_percentile(Urgency::Medium) < urgency_percentile(Urgency::High));
        assert!(urgency_percentile(Urgency::High) < urgency_percentile(Urgency::VeryHigh));
    }
}
