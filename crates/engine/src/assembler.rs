//! Transaction assembly and budget estimation.
//!
//! Turns a caller's instruction list into one bounded transaction:
//! compute-budget instructions in front, size and compute-unit limits
//! validated against the network maxima. Violations are typed errors;
//! the assembler never drops or truncates instructions. Splitting is a
//! caller decision.

use crate::error::EngineError;
use clmm_keeper_protocols::COMPUTE_BUDGET_PROGRAM;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, transaction::Transaction};
use tracing::debug;

/// Network packet limit for a serialized transaction.
pub const MAX_TRANSACTION_BYTES: usize = 1232;

/// Network per-transaction compute-unit maximum.
pub const MAX_COMPUTE_UNITS: u32 = 1_400_000;

/// Per-instruction compute estimate when the caller supplies no
/// override; generous for CLMM instructions, still far below the cap
/// for any transaction that fits in a packet.
const COMPUTE_UNITS_PER_INSTRUCTION: u32 = 120_000;

/// A validated, fee-primed transaction ready for submission.
///
/// Holds instructions rather than a signed transaction so the
/// submission layer can re-sign with a fresh blockhash on retry.
#[derive(Debug, Clone)]
pub struct BoundedTransaction {
    pub instructions: Vec<Instruction>,
    pub compute_limit: u32,
    pub priority_fee_micro_lamports: u64,
}

impl BoundedTransaction {
    /// Priority fee in lamports this transaction bids, rounded up the
    /// way the runtime rounds.
    #[must_use]
    pub fn priority_fee_lamports(&self) -> u64 {
        priority_fee_lamports(self.compute_limit, self.priority_fee_micro_lamports)
    }
}

/// Lamports charged for `limit` CU at `micro_lamports` per CU.
#[must_use]
pub fn priority_fee_lamports(limit: u32, micro_lamports: u64) -> u64 {
    ((u128::from(limit) * u128::from(micro_lamports)).div_ceil(1_000_000)) as u64
}

fn set_compute_unit_limit(units: u32) -> Instruction {
    let mut data = Vec::with_capacity(5);
    data.push(2);
    data.extend_from_slice(&units.to_le_bytes());
    Instruction {
        program_id: *COMPUTE_BUDGET_PROGRAM,
        accounts: vec![],
        data,
    }
}

fn set_compute_unit_price(micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(3);
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    Instruction {
        program_id: *COMPUTE_BUDGET_PROGRAM,
        accounts: vec![],
        data,
    }
}

/// Assembles `instructions` into a bounded, fee-primed transaction.
///
/// `compute_limit_override` bypasses estimation when the caller already
/// knows the budget (e.g. from a prior simulation of the same shape).
pub fn assemble(
    instructions: Vec<Instruction>,
    payer: &Pubkey,
    priority_fee_micro_lamports: u64,
    compute_limit_override: Option<u32>,
) -> Result<BoundedTransaction, EngineError> {
    if instructions.is_empty() {
        return Err(EngineError::Fatal("no instructions to assemble".to_string()));
    }

    let compute_limit = match compute_limit_override {
        Some(requested) => {
            if requested > MAX_COMPUTE_UNITS {
                return Err(EngineError::ComputeBudgetExceeded {
                    requested,
                    limit: MAX_COMPUTE_UNITS,
                });
            }
            requested
        }
        None => (instructions.len() as u32)
            .saturating_mul(COMPUTE_UNITS_PER_INSTRUCTION)
            .min(MAX_COMPUTE_UNITS),
    };

    let mut all = Vec::with_capacity(instructions.len() + 2);
    all.push(set_compute_unit_limit(compute_limit));
    all.push(set_compute_unit_price(priority_fee_micro_lamports));
    all.extend(instructions);

    let bytes = serialized_size(&all, payer);
    if bytes > MAX_TRANSACTION_BYTES {
        return Err(EngineError::OversizedTransaction {
            bytes,
            limit: MAX_TRANSACTION_BYTES,
        });
    }

    debug!(
        instructions = all.len(),
        bytes, compute_limit, priority_fee_micro_lamports, "assembled transaction"
    );

    Ok(BoundedTransaction {
        instructions: all,
        compute_limit,
        priority_fee_micro_lamports,
    })
}

/// Serialized wire size: signature section plus the compiled message.
/// The blockhash is fixed-width, so a placeholder message sizes exactly.
fn serialized_size(instructions: &[Instruction], payer: &Pubkey) -> usize {
    let tx = Transaction::new_with_payer(instructions, Some(payer));
    let signatures = usize::from(tx.message.header.num_required_signatures);
    // 1-byte shortvec length prefix covers up to 127 signatures.
    1 + signatures * 64 + tx.message_data().len()
}
