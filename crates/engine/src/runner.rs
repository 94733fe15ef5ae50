//! End-to-end execution: build, price, assemble, submit, settle.
//!
//! [`run_and_settle`] is the engine's front door. Retry layering:
//! transient network and blockhash failures are resolved inside the
//! submission layer with the same instruction payload; program errors
//! the caller named as retryable come back out here so the instruction
//! builder can produce a refreshed payload before the next attempt.

use crate::assembler::assemble;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::oracle::estimate_priority_fee;
use crate::retry::{self, RetryPolicy};
use crate::settle::{SettlementSummary, summarize};
use crate::submit::{SubmissionResult, submit_and_confirm};
use clmm_keeper_domain::Urgency;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use std::sync::Arc;
use tracing::{debug, info};

/// A confirmed execution and its settlement accounting.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub submission: SubmissionResult,
    pub summary: Arc<SettlementSummary>,
}

/// Whether a finished attempt should be rebuilt and re-run. Only
/// program errors the caller named qualify; transient conditions were
/// already retried below us.
pub(crate) fn rebuild_retryable<T>(
    policy: &RetryPolicy<T>,
    result: &Result<T, EngineError>,
) -> bool {
    match result {
        Err(e) => match e.root().program_error_name() {
            Some(name) => policy.program_error_retryable(name),
            None => false,
        },
        Ok(_) => false,
    }
}

/// Unique account keys a transaction touches, for fee estimation.
fn touched_accounts(instructions: &[Instruction]) -> Vec<Pubkey> {
    let mut keys: Vec<Pubkey> = Vec::new();
    for ix in instructions {
        for key in std::iter::once(&ix.program_id).chain(ix.accounts.iter().map(|m| &m.pubkey)) {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
    }
    keys
}

/// Builds instructions via `build`, prices and submits them, and
/// settles the confirmed transaction into a summary.
///
/// `build` is invoked once per outer attempt with the attempt index, so
/// payloads carrying quotes or timestamps can be refreshed when a named
/// program error sends us around again.
pub async fn run_and_settle<B>(
    ctx: &EngineContext,
    urgency: Urgency,
    policy: &RetryPolicy<SubmissionResult>,
    mut build: B,
) -> Result<ExecutionOutcome, EngineError>
where
    B: FnMut(u32) -> Result<Vec<Instruction>, EngineError>,
{
    let classifier = policy.clone();
    let rebuild = policy
        .clone()
        .retry_if(move |result| rebuild_retryable(&classifier, result));
    // The submission layer owns transient retries; rebuild-worthy
    // program errors must surface instead of being retried in place.
    let submit_policy = policy.clone().retry_program_errors(Vec::<String>::new());

    let submission = retry::execute(&rebuild, |attempt| {
        let built = build(attempt);
        let submit_policy = submit_policy.clone();
        async move {
            let instructions = built?;
            let accounts = touched_accounts(&instructions);
            let fee = estimate_priority_fee(ctx, &accounts, urgency).await;
            debug!(attempt, fee, instructions = instructions.len(), "executing payload");

            let bounded = assemble(instructions, &ctx.wallet.pubkey(), fee, None)?;
            submit_and_confirm(ctx, &bounded, &submit_policy).await
        }
    })
    .await?;

    let summary = summarize(ctx, &submission.signature).await?;
    info!(
        signature = %submission.signature,
        slot = submission.slot,
        usd = %summary.usd_delta,
        "execution settled"
    );
    Ok(ExecutionOutcome {
        submission,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clmm_keeper_protocols::orca::WHIRLPOOL_PROGRAM;
    use solana_sdk::instruction::AccountMeta;

    #[test]
    fn rebuild_only_for_named_program_errors() {
        let policy = RetryPolicy::<SubmissionResult>::standard()
            .retry_program_errors(["InvalidTimestamp"]);

        let named = EngineError::program(*WHIRLPOOL_PROGRAM, 6036);
        assert!(rebuild_retryable(&policy, &Err(named)));

        let unnamed = EngineError::program(*WHIRLPOOL_PROGRAM, 6017);
        assert!(!rebuild_retryable(&policy, &Err(unnamed)));

        // Transient failures were already retried by the submission layer.
        assert!(!rebuild_retryable(
            &policy,
            &Err(EngineError::BlockhashExpired)
        ));
    }

    #[test]
    fn rebuild_sees_through_exhaustion_wrappers() {
        let policy = RetryPolicy::<SubmissionResult>::standard()
            .retry_program_errors(["InvalidTimestamp"]);
        let wrapped = EngineError::RetriesExhausted {
            attempts: 2,
            last: Box::new(EngineError::program(*WHIRLPOOL_PROGRAM, 6036)),
        };
        assert!(rebuild_retryable(&policy, &Err(wrapped)));
    }

    #[test]
    fn touched_accounts_dedupe_preserving_order() {
        let shared = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let ix = |program: Pubkey, keys: Vec<Pubkey>| Instruction {
            program_id: program,
            accounts: keys.into_iter().map(|k| AccountMeta::new(k, false)).collect(),
            data: vec![],
        };

        let program = Pubkey::new_unique();
        let accounts = touched_accounts(&[
            ix(program, vec![shared, other]),
            ix(program, vec![shared]),
        ]);
        assert_eq!(accounts, vec![program, shared, other]);
    }
}
