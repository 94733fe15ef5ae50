//! Token fiat price lookups.
//!
//! Stable-pegged mints short-circuit to a fixed value without any
//! network call. Everything else goes through the price API once and
//! is memoized under both mint address and symbol. A failed lookup is
//! "unavailable" (`None`), never an error: downstream valuation treats
//! it as zero plus a flag.

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::retry::{self, RetryPolicy};
use clmm_keeper_domain::token::{known_symbol, stable_value};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, warn};

/// Memoized price cache entry.
#[derive(Debug, Clone, Copy)]
pub struct PriceEntry {
    pub price: Decimal,
    pub fetched_at: Instant,
}

#[derive(Deserialize)]
struct PriceResponse {
    success: bool,
    data: Option<PriceData>,
}

#[derive(Deserialize)]
struct PriceData {
    value: f64,
}

/// Returns the fiat price for `mint`, or `None` when unavailable.
pub async fn token_price(ctx: &EngineContext, mint: &str) -> Option<Decimal> {
    if let Some(fixed) = stable_value(mint) {
        return Some(fixed);
    }

    if let Some(entry) = ctx.prices.get(mint) {
        // Entries are never evicted; surface the age so staleness is at
        // least visible in logs.
        debug!(
            mint,
            age_secs = entry.fetched_at.elapsed().as_secs(),
            "price cache hit"
        );
        return Some(entry.price);
    }

    let policy = RetryPolicy::quick();
    let fetched = retry::execute(&policy, |_| fetch_price(ctx, mint)).await;
    match fetched {
        Ok(price) => {
            let entry = PriceEntry {
                price,
                fetched_at: Instant::now(),
            };
            ctx.prices.insert(mint.to_string(), entry);
            if let Some(symbol) = known_symbol(mint) {
                ctx.prices.insert(symbol.to_string(), entry);
            }
            Some(price)
        }
        Err(e) => {
            warn!(mint, error = %e, "price unavailable, valuing as zero");
            None
        }
    }
}

async fn fetch_price(ctx: &EngineContext, mint: &str) -> Result<Decimal, EngineError> {
    let url = format!("{}/defi/price?address={}", ctx.config.price_oracle_url, mint);
    let mut request = ctx.http.get(&url);
    if let Some(key) = &ctx.config.price_api_key {
        request = request.header("X-API-KEY", key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| EngineError::Network(e.to_string()))?;
    if !response.status().is_success() {
        return Err(EngineError::Network(format!(
            "price api returned {}",
            response.status()
        )));
    }
    let body: PriceResponse = response
        .json()
        .await
        .map_err(|e| EngineError::Network(format!("malformed price response: {e}")))?;

    let value = body
        .data
        .filter(|_| body.success)
        .map(|d| d.value)
        .ok_or_else(|| EngineError::Network("price api reported no value".to_string()))?;
    Decimal::from_f64(value)
        .ok_or_else(|| EngineError::Network(format!("unrepresentable price {value}")))
}
