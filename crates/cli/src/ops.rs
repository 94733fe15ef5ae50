//! Keeper operations: the glue between protocol instruction producers,
//! the execution engine, and settlement persistence.

use anyhow::{Context, Result, anyhow};
use clmm_keeper_data::Database;
use clmm_keeper_domain::{OperationKind, Protocol, Urgency};
use clmm_keeper_engine::context::EngineContext;
use clmm_keeper_engine::error::EngineError;
use clmm_keeper_engine::retry::RetryPolicy;
use clmm_keeper_engine::runner::{ExecutionOutcome, run_and_settle};
use clmm_keeper_engine::settle::{SettlementSummary, summarize};
use clmm_keeper_engine::submit::SubmissionResult;
use clmm_keeper_protocols::{InstructionProducer, meteora::MeteoraDlmm, orca::OrcaWhirlpool};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Delay between successive task starts when fanning out, so a batch
/// does not race itself for the same recent blockhash window.
const FAN_OUT_STAGGER: Duration = Duration::from_millis(250);

/// Shared handles for all keeper operations.
pub struct Keeper {
    pub ctx: Arc<EngineContext>,
    pub db: Option<Database>,
}

/// Program errors worth a rebuilt payload: both resolve themselves once
/// the instruction is regenerated against fresher on-chain state.
const REBUILDABLE_ERRORS: [&str; 2] = ["InvalidTimestamp", "StaleOraclePrice"];

fn producer_for(protocol: Protocol) -> Box<dyn InstructionProducer> {
    match protocol {
        Protocol::OrcaWhirlpool => Box::new(OrcaWhirlpool::new()),
        Protocol::MeteoraDlmm => Box::new(MeteoraDlmm::new()),
    }
}

fn submission_policy() -> RetryPolicy<SubmissionResult> {
    RetryPolicy::standard().retry_program_errors(REBUILDABLE_ERRORS)
}

fn fatal(e: anyhow::Error) -> EngineError {
    EngineError::Fatal(e.to_string())
}

impl Keeper {
    async fn execute(
        &self,
        operation: OperationKind,
        protocol: Protocol,
        position: Option<&Pubkey>,
        pool: &Pubkey,
        urgency: Urgency,
        build: impl FnMut(u32) -> Result<Vec<solana_sdk::instruction::Instruction>, EngineError>,
    ) -> Result<ExecutionOutcome> {
        let outcome = run_and_settle(&self.ctx, urgency, &submission_policy(), build)
            .await
            .with_context(|| format!("{operation} on {protocol} failed"))?;

        if let Some(db) = &self.db {
            let position = position.map(|p| p.to_string());
            let pool = pool.to_string();
            db.settlements()
                .save(
                    operation,
                    protocol,
                    position.as_deref(),
                    Some(pool.as_str()),
                    &outcome.summary,
                )
                .await
                .context("recording settlement")?;
        }
        print_summary(&outcome.summary);
        Ok(outcome)
    }

    /// Opens and funds a position over `[lower, upper]`.
    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        &self,
        protocol: Protocol,
        pool: Pubkey,
        lower: i32,
        upper: i32,
        amount_a: u64,
        amount_b: u64,
        urgency: Urgency,
    ) -> Result<ExecutionOutcome> {
        let producer = producer_for(protocol);
        let owner = self.ctx.wallet.pubkey();
        self.execute(OperationKind::Open, protocol, None, &pool, urgency, move |_| {
            producer
                .open_position(&pool, &owner, lower, upper, amount_a, amount_b)
                .map_err(fatal)
        })
        .await
    }

    /// Drains and closes a position.
    pub async fn close(
        &self,
        protocol: Protocol,
        position: Pubkey,
        pool: Pubkey,
        urgency: Urgency,
    ) -> Result<ExecutionOutcome> {
        let producer = producer_for(protocol);
        let owner = self.ctx.wallet.pubkey();
        self.execute(OperationKind::Close, protocol, Some(&position), &pool, urgency, move |_| {
            producer.close_position(&position, &pool, &owner).map_err(fatal)
        })
        .await
    }

    /// Moves a position to a new range in one transaction: drain and
    /// close the old position, open and fund the new one.
    #[allow(clippy::too_many_arguments)]
    pub async fn rebalance(
        &self,
        protocol: Protocol,
        position: Pubkey,
        pool: Pubkey,
        lower: i32,
        upper: i32,
        amount_a: u64,
        amount_b: u64,
        urgency: Urgency,
    ) -> Result<ExecutionOutcome> {
        let producer = producer_for(protocol);
        let owner = self.ctx.wallet.pubkey();
        self.execute(OperationKind::Rebalance, protocol, Some(&position), &pool, urgency, move |_| {
            let mut instructions = producer
                .close_position(&position, &pool, &owner)
                .map_err(fatal)?;
            instructions.extend(
                producer
                    .open_position(&pool, &owner, lower, upper, amount_a, amount_b)
                    .map_err(fatal)?,
            );
            Ok(instructions)
        })
        .await
    }

    /// Collects accrued fees and rewards without touching liquidity.
    pub async fn harvest(
        &self,
        protocol: Protocol,
        position: Pubkey,
        pool: Pubkey,
        urgency: Urgency,
    ) -> Result<ExecutionOutcome> {
        let producer = producer_for(protocol);
        let owner = self.ctx.wallet.pubkey();
        self.execute(OperationKind::Harvest, protocol, Some(&position), &pool, urgency, move |_| {
            producer.harvest(&position, &pool, &owner).map_err(fatal)
        })
        .await
    }

    /// Closes many positions concurrently with a fixed start stagger.
    /// Failures are reported per position; one bad position never stops
    /// the rest of the batch.
    pub async fn close_all(
        &self,
        protocol: Protocol,
        positions: Vec<(Pubkey, Pubkey)>,
        urgency: Urgency,
    ) -> Result<usize> {
        let mut tasks = JoinSet::new();
        for (index, (position, pool)) in positions.into_iter().enumerate() {
            let ctx = self.ctx.clone();
            let db = self.db.clone();
            tasks.spawn(async move {
                tokio::time::sleep(FAN_OUT_STAGGER * index as u32).await;
                let keeper = Keeper { ctx, db };
                let result = keeper.close(protocol, position, pool, urgency).await;
                (position, result)
            });
        }

        let mut closed = 0;
        while let Some(joined) = tasks.join_next().await {
            let (position, result) = joined.context("close task panicked")?;
            match result {
                Ok(outcome) => {
                    info!(%position, signature = %outcome.submission.signature, "position closed");
                    closed += 1;
                }
                Err(e) => error!(%position, error = %e, "close failed"),
            }
        }
        Ok(closed)
    }

    /// Summarizes an already-landed transaction by signature.
    pub async fn summarize_signature(&self, signature: &str) -> Result<()> {
        let signature =
            Signature::from_str(signature).context("not a valid transaction signature")?;
        let summary = summarize(&self.ctx, &signature).await?;
        print_summary(&summary);
        Ok(())
    }
}

/// Parses an urgency level from its CLI spelling.
pub fn parse_urgency(raw: &str) -> Result<Urgency> {
    match raw.to_ascii_lowercase().as_str() {
        "low" => Ok(Urgency::Low),
        "medium" => Ok(Urgency::Medium),
        "high" => Ok(Urgency::High),
        "very-high" | "veryhigh" => Ok(Urgency::VeryHigh),
        other => Err(anyhow!(
            "unknown urgency {other:?}, expected low|medium|high|very-high"
        )),
    }
}

/// Parses a protocol name from its CLI spelling.
pub fn parse_protocol(raw: &str) -> Result<Protocol> {
    match raw.to_ascii_lowercase().as_str() {
        "orca" | "whirlpool" => Ok(Protocol::OrcaWhirlpool),
        "meteora" | "dlmm" => Ok(Protocol::MeteoraDlmm),
        other => Err(anyhow!("unknown protocol {other:?}, expected orca|meteora")),
    }
}

/// Parses a `POSITION:POOL` pair as passed to close-all.
pub fn parse_position_pair(raw: &str) -> Result<(Pubkey, Pubkey)> {
    let (position, pool) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("expected POSITION:POOL, got {raw:?}"))?;
    Ok((
        Pubkey::from_str(position).with_context(|| format!("bad position address {position:?}"))?,
        Pubkey::from_str(pool).with_context(|| format!("bad pool address {pool:?}"))?,
    ))
}

fn print_summary(summary: &SettlementSummary) {
    println!("Signature:      {}", summary.signature);
    println!("Slot:           {}", summary.slot);
    println!(
        "Fee:            {} lamports ({} priority)",
        summary.fee, summary.priority_fee
    );
    if let Some(cu) = summary.compute_units_consumed {
        println!("Compute units:  {cu}");
    }
    if summary.partial {
        println!("⚠ partial: inner instruction meta was unavailable");
    }
    if let Some(err) = &summary.error {
        println!("✗ failed on chain: {err} (fee paid, no movements executed)");
    }
    println!("Token deltas:");
    if summary.per_mint_deltas.is_empty() {
        println!("  (none)");
    }
    for (mint, delta) in &summary.per_mint_deltas {
        println!("  {mint:<44} {delta:>20}");
    }
    if !summary.unpriced_mints.is_empty() {
        println!("Unpriced mints: {}", summary.unpriced_mints.join(", "));
    }
    println!("USD delta:      {}", summary.usd_delta);
    println!("Instructions:");
    for decoded in &summary.decoded {
        print_decoded(decoded, 1);
    }
}

fn print_decoded(ix: &clmm_keeper_engine::decode::DecodedInstruction, depth: usize) {
    println!("{}{}", "  ".repeat(depth), ix.kind.name());
    for inner in &ix.inner {
        print_decoded(inner, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_spellings() {
        assert_eq!(parse_urgency("low").unwrap(), Urgency::Low);
        assert_eq!(parse_urgency("Medium").unwrap(), Urgency::Medium);
        assert_eq!(parse_urgency("very-high").unwrap(), Urgency::VeryHigh);
        assert!(parse_urgency("urgent").is_err());
    }

    #[test]
    fn protocol_spellings() {
        assert_eq!(parse_protocol("orca").unwrap(), Protocol::OrcaWhirlpool);
        assert_eq!(parse_protocol("DLMM").unwrap(), Protocol::MeteoraDlmm);
        assert!(parse_protocol("raydium").is_err());
    }

    #[test]
    fn position_pairs_split_on_colon() {
        let position = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let raw = format!("{position}:{pool}");
        assert_eq!(parse_position_pair(&raw).unwrap(), (position, pool));
        assert!(parse_position_pair("missing-separator").is_err());
    }
}
