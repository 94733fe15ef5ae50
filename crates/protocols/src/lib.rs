//! Pool-protocol collaborators: instruction builders, decode tables, and
//! program error tables for Orca Whirlpools and Meteora DLMM.
//!
//! The execution engine treats these as opaque instruction producers: it
//! never reasons about quote math or tick/bin layout, only about program
//! ids, discriminators, and error codes.

pub mod decode;
pub mod errors;
pub mod meteora;
pub mod orca;

use anyhow::Result;
use clmm_keeper_domain::Protocol;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use std::str::FromStr;
use std::sync::LazyLock;

/// Associated token program ID.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// System program ID.
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

/// Compute budget program ID.
pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";

pub static ASSOCIATED_TOKEN_PROGRAM: LazyLock<Pubkey> = LazyLock::new(|| {
    Pubkey::from_str(ASSOCIATED_TOKEN_PROGRAM_ID).expect("Invalid ATA program ID")
});

pub static SYSTEM_PROGRAM: LazyLock<Pubkey> =
    LazyLock::new(|| Pubkey::from_str(SYSTEM_PROGRAM_ID).expect("Invalid system program ID"));

pub static COMPUTE_BUDGET_PROGRAM: LazyLock<Pubkey> = LazyLock::new(|| {
    Pubkey::from_str(COMPUTE_BUDGET_PROGRAM_ID).expect("Invalid compute budget program ID")
});

/// Token program ID (re-exported for decode-table consumers).
#[must_use]
pub fn token_program() -> Pubkey {
    spl_token::ID
}

/// A protocol-specific producer of ready-made position instructions.
///
/// Implementations own account derivation and payload encoding; callers
/// hand the returned instructions straight to the execution engine.
pub trait InstructionProducer: Send + Sync {
    /// Protocol this producer targets.
    fn protocol(&self) -> Protocol;

    /// Instructions opening a position over `[lower, upper]` and funding it.
    fn open_position(
        &self,
        pool: &Pubkey,
        owner: &Pubkey,
        lower: i32,
        upper: i32,
        amount_a: u64,
        amount_b: u64,
    ) -> Result<Vec<Instruction>>;

    /// Instructions draining and closing a position
    /// (withdraw all liquidity, collect fees, close accounts).
    fn close_position(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
    ) -> Result<Vec<Instruction>>;

    /// Instructions collecting accrued fees and rewards without touching
    /// liquidity.
    fn harvest(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
    ) -> Result<Vec<Instruction>>;
}

/// Derives the associated token account for `owner`/`mint`.
#[must_use]
pub fn derive_ata(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (ata, _bump) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program().as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM,
    );
    ata
}
