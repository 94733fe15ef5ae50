//! Transaction submission and confirmation.
//!
//! Each attempt signs with a fresh blockhash, sends with preflight
//! skipped, and polls signature status up to the confirm deadline.
//! Before re-sending, the previous attempt's signature is checked so a
//! transaction that landed while we were timing out is never sent twice.
//!
//! Retry classification: transient errors always retry, program errors
//! retry only when the caller's policy names them, everything else is
//! final on the first occurrence.

use crate::assembler::BoundedTransaction;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::retry::{self, RetryPolicy};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{Instruction, InstructionError};
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::{Transaction, TransactionError};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A confirmed submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionResult {
    pub signature: Signature,
    pub slot: u64,
}

/// A looked-up signature status, reduced to what confirmation needs.
#[derive(Debug, Clone)]
pub struct SignatureStatusView {
    pub slot: u64,
    pub err: Option<TransactionError>,
    /// Whether the status satisfies the requested commitment.
    pub satisfied: bool,
}

/// The narrow RPC surface the submission loop uses. A seam so the
/// send/confirm state machine can run against scripted statuses.
#[async_trait]
pub trait SubmissionRpc: Send + Sync {
    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> Result<Hash, EngineError>;

    /// `instructions` is the submitted list including the budget
    /// prefix, so instruction indices in a rejected send resolve
    /// directly.
    async fn send(
        &self,
        tx: &Transaction,
        instructions: &[Instruction],
    ) -> Result<Signature, EngineError>;

    async fn status(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<SignatureStatusView>, EngineError>;
}

/// Production submission surface over the nonblocking RPC client.
pub struct RpcSubmitter {
    rpc: Arc<RpcClient>,
}

impl RpcSubmitter {
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl SubmissionRpc for RpcSubmitter {
    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> Result<Hash, EngineError> {
        let (blockhash, _) = self
            .rpc
            .get_latest_blockhash_with_commitment(commitment)
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        Ok(blockhash)
    }

    async fn send(
        &self,
        tx: &Transaction,
        instructions: &[Instruction],
    ) -> Result<Signature, EngineError> {
        let send_config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.rpc
            .send_transaction_with_config(tx, send_config)
            .await
            .map_err(|e| classify_send_error(e, instructions))
    }

    async fn status(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<SignatureStatusView>, EngineError> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|status| SignatureStatusView {
                slot: status.slot,
                satisfied: status.satisfies_commitment(commitment),
                err: status.err,
            }))
    }
}

/// Whether an error warrants another submission attempt under `policy`.
pub(crate) fn error_retryable<T>(policy: &RetryPolicy<T>, err: &EngineError) -> bool {
    if err.is_transient() {
        return true;
    }
    match err.program_error_name() {
        Some(name) => policy.program_error_retryable(name),
        None => false,
    }
}

/// Maps an on-chain transaction failure to the engine taxonomy.
///
/// `instructions` is the submitted list including the compute-budget
/// prefix, so instruction indices in the error resolve directly.
pub(crate) fn classify_transaction_error(
    err: &TransactionError,
    instructions: &[Instruction],
) -> EngineError {
    match err {
        TransactionError::BlockhashNotFound => EngineError::BlockhashExpired,
        TransactionError::InstructionError(index, InstructionError::Custom(code)) => {
            match instructions.get(usize::from(*index)) {
                Some(ix) => EngineError::program(ix.program_id, *code),
                None => EngineError::Fatal(format!(
                    "program error {code} at out-of-range instruction {index}"
                )),
            }
        }
        other => EngineError::Fatal(format!("transaction failed: {other}")),
    }
}

fn classify_send_error(
    err: solana_client::client_error::ClientError,
    instructions: &[Instruction],
) -> EngineError {
    match err.get_transaction_error() {
        Some(tx_err) => classify_transaction_error(&tx_err, instructions),
        None => EngineError::Network(err.to_string()),
    }
}

/// Submits `bounded` and waits for it to reach the configured
/// commitment, retrying under `policy`.
pub async fn submit_and_confirm(
    ctx: &EngineContext,
    bounded: &BoundedTransaction,
    policy: &RetryPolicy<SubmissionResult>,
) -> Result<SubmissionResult, EngineError> {
    let caller_predicate = policy.predicate();
    let classifier = policy.clone();
    let effective = policy.clone().retry_if(move |result| match result {
        Err(e) => error_retryable(&classifier, e),
        ok => caller_predicate(ok),
    });

    let last_signature: Arc<Mutex<Option<Signature>>> = Arc::new(Mutex::new(None));

    retry::execute(&effective, |attempt| {
        let last_signature = last_signature.clone();
        async move {
            if attempt > 0 {
                let prior = *last_signature.lock().unwrap();
                if let Some(signature) = prior
                    && let Some(landed) = already_landed(ctx, &signature).await
                {
                    info!(%signature, slot = landed.slot, "previous attempt landed, not re-sending");
                    return Ok(landed);
                }
            }

            let blockhash = ctx.submitter.latest_blockhash(ctx.config.commitment).await?;

            let tx = Transaction::new_signed_with_payer(
                &bounded.instructions,
                Some(&ctx.wallet.pubkey()),
                &[ctx.wallet.as_ref()],
                blockhash,
            );

            let signature = ctx.submitter.send(&tx, &bounded.instructions).await?;
            *last_signature.lock().unwrap() = Some(signature);
            debug!(%signature, attempt, "transaction sent");

            confirm(ctx, &signature, &bounded.instructions).await
        }
    })
    .await
}

/// Checks whether a previously sent signature already satisfies the
/// configured commitment. Lookup failures count as "not landed"; the
/// caller re-sends and the duplicate is rejected by the network.
async fn already_landed(ctx: &EngineContext, signature: &Signature) -> Option<SubmissionResult> {
    match ctx.submitter.status(signature, ctx.config.commitment).await {
        Ok(status) => {
            let status = status?;
            if status.err.is_none() && status.satisfied {
                Some(SubmissionResult {
                    signature: *signature,
                    slot: status.slot,
                })
            } else {
                None
            }
        }
        Err(e) => {
            warn!(%signature, error = %e, "status lookup failed before re-send");
            None
        }
    }
}

/// Polls the signature until it satisfies the configured commitment,
/// fails on chain, or the confirm deadline passes. A deadline without a
/// landed status means the blockhash can no longer be assumed valid.
async fn confirm(
    ctx: &EngineContext,
    signature: &Signature,
    instructions: &[Instruction],
) -> Result<SubmissionResult, EngineError> {
    let deadline = Instant::now() + ctx.config.confirm_timeout;
    loop {
        let status = ctx.submitter.status(signature, ctx.config.commitment).await?;

        if let Some(status) = status {
            if let Some(err) = &status.err {
                return Err(classify_transaction_error(err, instructions));
            }
            if status.satisfied {
                info!(%signature, slot = status.slot, "transaction confirmed");
                return Ok(SubmissionResult {
                    signature: *signature,
                    slot: status.slot,
                });
            }
        }

        if Instant::now() >= deadline {
            warn!(%signature, "confirmation deadline passed");
            return Err(EngineError::BlockhashExpired);
        }
        tokio::time::sleep(ctx.config.confirm_poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use clmm_keeper_protocols::orca::WHIRLPOOL_PROGRAM;
    use solana_sdk::signature::Keypair;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn budget_prefixed_instructions() -> Vec<Instruction> {
        let budget = |data: Vec<u8>| Instruction {
            program_id: *clmm_keeper_protocols::COMPUTE_BUDGET_PROGRAM,
            accounts: vec![],
            data,
        };
        vec![
            budget(vec![2, 0, 0, 0, 0]),
            budget(vec![3, 0, 0, 0, 0, 0, 0, 0, 0]),
            Instruction {
                program_id: *WHIRLPOOL_PROGRAM,
                accounts: vec![],
                data: vec![],
            },
        ]
    }

    #[test]
    fn custom_instruction_error_resolves_through_program_table() {
        let instructions = budget_prefixed_instructions();
        let err = classify_transaction_error(
            &TransactionError::InstructionError(2, InstructionError::Custom(6017)),
            &instructions,
        );
        assert_eq!(err.program_error_name(), Some("TokenMaxExceeded"));
    }

    #[test]
    fn blockhash_not_found_maps_to_expiry() {
        let err = classify_transaction_error(&TransactionError::BlockhashNotFound, &[]);
        assert!(matches!(err, EngineError::BlockhashExpired));
    }

    #[test]
    fn out_of_range_instruction_index_is_fatal() {
        let err = classify_transaction_error(
            &TransactionError::InstructionError(9, InstructionError::Custom(1)),
            &budget_prefixed_instructions(),
        );
        assert!(matches!(err, EngineError::Fatal(_)));
    }

    #[test]
    fn transient_errors_always_retry() {
        let policy = RetryPolicy::<SubmissionResult>::no_retry();
        assert!(error_retryable(&policy, &EngineError::Network("down".into())));
        assert!(error_retryable(&policy, &EngineError::BlockhashExpired));
    }

    #[test]
    fn program_errors_retry_only_when_named() {
        let policy = RetryPolicy::<SubmissionResult>::standard()
            .retry_program_errors(["InvalidTimestamp"]);

        let stale = EngineError::program(*WHIRLPOOL_PROGRAM, 6036);
        assert_eq!(stale.program_error_name(), Some("InvalidTimestamp"));
        assert!(error_retryable(&policy, &stale));

        let slippage = EngineError::program(*WHIRLPOOL_PROGRAM, 6017);
        assert!(!error_retryable(&policy, &slippage));
    }

    #[test]
    fn fatal_errors_never_retry() {
        let policy = RetryPolicy::<SubmissionResult>::standard()
            .retry_program_errors(["InvalidTimestamp"]);
        assert!(!error_retryable(
            &policy,
            &EngineError::Fatal("insufficient funds".into())
        ));
        assert!(!error_retryable(
            &policy,
            &EngineError::OversizedTransaction { bytes: 2000, limit: 1232 }
        ));
    }

    /// Replays a fixed sequence of status responses; an exhausted
    /// script answers "no status yet".
    struct ScriptedRpc {
        sends: AtomicU32,
        statuses: Mutex<VecDeque<Option<SignatureStatusView>>>,
    }

    impl ScriptedRpc {
        fn new(statuses: Vec<Option<SignatureStatusView>>) -> Arc<Self> {
            Arc::new(Self {
                sends: AtomicU32::new(0),
                statuses: Mutex::new(statuses.into()),
            })
        }
    }

    #[async_trait]
    impl SubmissionRpc for ScriptedRpc {
        async fn latest_blockhash(&self, _: CommitmentConfig) -> Result<Hash, EngineError> {
            Ok(Hash::new_unique())
        }

        async fn send(
            &self,
            tx: &Transaction,
            _: &[Instruction],
        ) -> Result<Signature, EngineError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(tx.signatures[0])
        }

        async fn status(
            &self,
            _: &Signature,
            _: CommitmentConfig,
        ) -> Result<Option<SignatureStatusView>, EngineError> {
            Ok(self.statuses.lock().unwrap().pop_front().flatten())
        }
    }

    fn scripted_ctx(rpc: Arc<ScriptedRpc>) -> EngineContext {
        let config = EngineConfig {
            confirm_timeout: Duration::from_secs(1),
            ..EngineConfig::default()
        };
        EngineContext::new(
            Arc::new(RpcClient::new("http://127.0.0.1:1".to_string())),
            Arc::new(Keypair::new()),
            config,
        )
        .with_submitter(rpc)
    }

    fn bounded_fixture() -> BoundedTransaction {
        BoundedTransaction {
            instructions: budget_prefixed_instructions(),
            compute_limit: 200_000,
            priority_fee_micro_lamports: 0,
        }
    }

    fn landed(slot: u64) -> Option<SignatureStatusView> {
        Some(SignatureStatusView {
            slot,
            err: None,
            satisfied: true,
        })
    }

    fn failed(code: u32) -> Option<SignatureStatusView> {
        Some(SignatureStatusView {
            slot: 10,
            err: Some(TransactionError::InstructionError(
                2,
                InstructionError::Custom(code),
            )),
            satisfied: true,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn named_program_error_is_resubmitted_until_confirmed() {
        let rpc = ScriptedRpc::new(vec![
            failed(6036), // first attempt fails on chain with InvalidTimestamp
            None,         // pre-resend landed check: nothing landed
            landed(99),   // second attempt confirms
        ]);
        let ctx = scripted_ctx(rpc.clone());
        let policy = RetryPolicy::<SubmissionResult>::standard()
            .retry_program_errors(["InvalidTimestamp"]);

        let result = submit_and_confirm(&ctx, &bounded_fixture(), &policy)
            .await
            .unwrap();
        assert_eq!(result.slot, 99);
        assert_eq!(rpc.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unnamed_program_error_is_final_on_first_occurrence() {
        let rpc = ScriptedRpc::new(vec![failed(6017)]);
        let ctx = scripted_ctx(rpc.clone());
        let policy = RetryPolicy::<SubmissionResult>::standard();

        let err = submit_and_confirm(&ctx, &bounded_fixture(), &policy)
            .await
            .unwrap_err();
        assert_eq!(err.program_error_name(), Some("TokenMaxExceeded"));
        assert_eq!(rpc.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transaction_landed_while_waiting_is_not_resent() {
        // The first attempt polls through its confirm window without a
        // status; the retry then finds the original send landed.
        let rpc = ScriptedRpc::new(vec![None, None, None, landed(77)]);
        let ctx = scripted_ctx(rpc.clone());
        let policy = RetryPolicy::<SubmissionResult>::standard();

        let result = submit_and_confirm(&ctx, &bounded_fixture(), &policy)
            .await
            .unwrap();
        assert_eq!(result.slot, 77);
        assert_eq!(rpc.sends.load(Ordering::SeqCst), 1);
    }
}
