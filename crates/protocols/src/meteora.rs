//! Meteora DLMM instruction builders.
//!
//! Same shape as the Orca builders: anchor discriminator plus
//! little-endian arguments, accounts in program order. Bin-math and
//! strategy parameters are the program's concern; the keeper only passes
//! bounds and amounts through.

use crate::token_program;
use anyhow::Result;
use clmm_keeper_domain::Protocol;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::str::FromStr;
use std::sync::LazyLock;

/// Meteora DLMM program ID (mainnet).
pub const DLMM_PROGRAM_ID: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";

pub static DLMM_PROGRAM: LazyLock<Pubkey> =
    LazyLock::new(|| Pubkey::from_str(DLMM_PROGRAM_ID).expect("Invalid program ID"));

/// Anchor discriminators for the DLMM instructions the keeper builds or
/// decodes.
pub mod discriminator {
    pub const INITIALIZE_POSITION: [u8; 8] = [0xdb, 0x01, 0xcc, 0x99, 0x0f, 0xc3, 0x8a, 0x55];
    pub const ADD_LIQUIDITY: [u8; 8] = [0xb5, 0x9d, 0x59, 0x43, 0x8f, 0xb6, 0x34, 0x48];
    pub const REMOVE_LIQUIDITY: [u8; 8] = [0x5a, 0x3b, 0x4a, 0x85, 0xcb, 0x16, 0xd2, 0x42];
    pub const CLAIM_FEE: [u8; 8] = [0xa9, 0x20, 0x4f, 0x89, 0x88, 0xe8, 0x46, 0x89];
    pub const CLAIM_REWARD: [u8; 8] = [0x95, 0x5f, 0xbe, 0x62, 0x74, 0x32, 0x35, 0xc0];
    pub const CLOSE_POSITION: [u8; 8] = [0x7b, 0x43, 0x9b, 0xb5, 0x8f, 0x52, 0x1c, 0xbf];
}

/// Instruction builder for Meteora DLMM positions.
pub struct MeteoraDlmm {
    program_id: Pubkey,
}

impl Default for MeteoraDlmm {
    fn default() -> Self {
        Self::new()
    }
}

impl MeteoraDlmm {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program_id: *DLMM_PROGRAM,
        }
    }

    fn derive_position(&self, pool: &Pubkey, owner: &Pubkey, lower_bin: i32) -> Pubkey {
        let (position, _bump) = Pubkey::find_program_address(
            &[
                b"position",
                pool.as_ref(),
                owner.as_ref(),
                &lower_bin.to_le_bytes(),
            ],
            &self.program_id,
        );
        position
    }

    fn build_initialize_position(
        &self,
        pool: &Pubkey,
        owner: &Pubkey,
        lower_bin: i32,
        width: i32,
    ) -> Instruction {
        let position = self.derive_position(pool, owner, lower_bin);

        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&discriminator::INITIALIZE_POSITION);
        data.extend_from_slice(&lower_bin.to_le_bytes());
        data.extend_from_slice(&width.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(*owner, true), // payer
            AccountMeta::new(position, false),
            AccountMeta::new_readonly(*pool, false), // lb_pair
            AccountMeta::new_readonly(*owner, true), // owner
            AccountMeta::new_readonly(*crate::SYSTEM_PROGRAM, false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn build_add_liquidity(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
        amount_x: u64,
        amount_y: u64,
    ) -> Instruction {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&discriminator::ADD_LIQUIDITY);
        data.extend_from_slice(&amount_x.to_le_bytes());
        data.extend_from_slice(&amount_y.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(*position, false),
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(*owner, true), // sender
            AccountMeta::new_readonly(token_program(), false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn build_remove_liquidity(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
        bps: u16,
    ) -> Instruction {
        let mut data = Vec::with_capacity(10);
        data.extend_from_slice(&discriminator::REMOVE_LIQUIDITY);
        data.extend_from_slice(&bps.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(*position, false),
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new_readonly(token_program(), false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn build_claim_fee(&self, position: &Pubkey, pool: &Pubkey, owner: &Pubkey) -> Instruction {
        let accounts = vec![
            AccountMeta::new(*position, false),
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new_readonly(token_program(), false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data: discriminator::CLAIM_FEE.to_vec(),
        }
    }

    fn build_claim_reward(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
        reward_index: u64,
    ) -> Instruction {
        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&discriminator::CLAIM_REWARD);
        data.extend_from_slice(&reward_index.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(*position, false),
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new_readonly(token_program(), false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn build_close_position(&self, position: &Pubkey, owner: &Pubkey) -> Instruction {
        let accounts = vec![
            AccountMeta::new(*position, false),
            AccountMeta::new_readonly(*owner, true), // owner
            AccountMeta::new(*owner, false),         // rent receiver
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data: discriminator::CLOSE_POSITION.to_vec(),
        }
    }
}

impl crate::InstructionProducer for MeteoraDlmm {
    fn protocol(&self) -> Protocol {
        Protocol::MeteoraDlmm
    }

    fn open_position(
        &self,
        pool: &Pubkey,
        owner: &Pubkey,
        lower: i32,
        upper: i32,
        amount_a: u64,
        amount_b: u64,
    ) -> Result<Vec<Instruction>> {
        let width = upper.saturating_sub(lower).max(1);
        let position = self.derive_position(pool, owner, lower);
        Ok(vec![
            self.build_initialize_position(pool, owner, lower, width),
            self.build_add_liquidity(&position, pool, owner, amount_a, amount_b),
        ])
    }

    fn close_position(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
    ) -> Result<Vec<Instruction>> {
        // 10_000 bps = withdraw the whole position.
        Ok(vec![
            self.build_remove_liquidity(position, pool, owner, 10_000),
            self.build_claim_fee(position, pool, owner),
            self.build_close_position(position, owner),
        ])
    }

    fn harvest(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
    ) -> Result<Vec<Instruction>> {
        Ok(vec![
            self.build_claim_fee(position, pool, owner),
            self.build_claim_reward(position, pool, owner, 0),
        ])
    }
}
