//! Orca Whirlpool instruction builders.
//!
//! Encodes Whirlpool program instructions by hand: 8-byte anchor
//! discriminator followed by little-endian arguments. The engine treats
//! the output as opaque; only the discriminator table below is shared
//! with the decoder.

use crate::{ASSOCIATED_TOKEN_PROGRAM, SYSTEM_PROGRAM, derive_ata, token_program};
use anyhow::Result;
use clmm_keeper_domain::Protocol;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::str::FromStr;
use std::sync::LazyLock;

/// Orca Whirlpool program ID (mainnet).
pub const WHIRLPOOL_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";

pub static WHIRLPOOL_PROGRAM: LazyLock<Pubkey> =
    LazyLock::new(|| Pubkey::from_str(WHIRLPOOL_PROGRAM_ID).expect("Invalid program ID"));

/// Anchor discriminators for the Whirlpool instructions the keeper
/// builds or decodes.
pub mod discriminator {
    pub const OPEN_POSITION: [u8; 8] = [0x87, 0x80, 0x2f, 0x4d, 0x0f, 0x98, 0xf0, 0x31];
    pub const INCREASE_LIQUIDITY: [u8; 8] = [0x2e, 0x9c, 0xf3, 0x76, 0x0d, 0xc6, 0x1e, 0x84];
    pub const DECREASE_LIQUIDITY: [u8; 8] = [0xa0, 0x26, 0xd0, 0x6f, 0x68, 0x5b, 0x2c, 0x01];
    pub const COLLECT_FEES: [u8; 8] = [0xa4, 0x98, 0xcf, 0x63, 0x1e, 0xba, 0x13, 0x7a];
    pub const COLLECT_REWARD: [u8; 8] = [0x46, 0x05, 0x84, 0x57, 0x56, 0xeb, 0xb1, 0x22];
    pub const CLOSE_POSITION: [u8; 8] = [0x7b, 0x86, 0x51, 0x0c, 0x31, 0x5b, 0xfc, 0x00];
    pub const SWAP: [u8; 8] = [0xf8, 0xc6, 0x9e, 0x91, 0xe1, 0x75, 0x87, 0xc8];
}

/// Instruction builder for Orca Whirlpool positions.
pub struct OrcaWhirlpool {
    program_id: Pubkey,
}

impl Default for OrcaWhirlpool {
    fn default() -> Self {
        Self::new()
    }
}

impl OrcaWhirlpool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program_id: *WHIRLPOOL_PROGRAM,
        }
    }

    fn derive_position_mint(&self, pool: &Pubkey, tick_lower: i32, tick_upper: i32) -> Pubkey {
        let (mint, _bump) = Pubkey::find_program_address(
            &[
                b"position_mint",
                pool.as_ref(),
                &tick_lower.to_le_bytes(),
                &tick_upper.to_le_bytes(),
            ],
            &self.program_id,
        );
        mint
    }

    fn build_open_position(
        &self,
        pool: &Pubkey,
        owner: &Pubkey,
        tick_lower: i32,
        tick_upper: i32,
    ) -> Instruction {
        let position_mint = self.derive_position_mint(pool, tick_lower, tick_upper);
        let (position, _bump) = Pubkey::find_program_address(
            &[b"position", position_mint.as_ref()],
            &self.program_id,
        );
        let position_token_account = derive_ata(owner, &position_mint);

        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&discriminator::OPEN_POSITION);
        data.extend_from_slice(&tick_lower.to_le_bytes());
        data.extend_from_slice(&tick_upper.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(*owner, true),                  // funder
            AccountMeta::new_readonly(*owner, false),        // owner
            AccountMeta::new(position, false),               // position
            AccountMeta::new(position_mint, true),           // position_mint
            AccountMeta::new(position_token_account, false), // position_token_account
            AccountMeta::new_readonly(*pool, false),         // whirlpool
            AccountMeta::new_readonly(token_program(), false),
            AccountMeta::new_readonly(*SYSTEM_PROGRAM, false),
            AccountMeta::new_readonly(solana_sdk::sysvar::rent::ID, false),
            AccountMeta::new_readonly(*ASSOCIATED_TOKEN_PROGRAM, false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn build_increase_liquidity(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
        token_max_a: u64,
        token_max_b: u64,
    ) -> Instruction {
        let mut data = Vec::with_capacity(40);
        data.extend_from_slice(&discriminator::INCREASE_LIQUIDITY);
        data.extend_from_slice(&0u128.to_le_bytes()); // liquidity_amount (program-computed)
        data.extend_from_slice(&token_max_a.to_le_bytes());
        data.extend_from_slice(&token_max_b.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(token_program(), false),
            AccountMeta::new_readonly(*owner, true), // position_authority
            AccountMeta::new(*position, false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn build_decrease_liquidity(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
        liquidity_amount: u128,
        token_min_a: u64,
        token_min_b: u64,
    ) -> Instruction {
        let mut data = Vec::with_capacity(40);
        data.extend_from_slice(&discriminator::DECREASE_LIQUIDITY);
        data.extend_from_slice(&liquidity_amount.to_le_bytes());
        data.extend_from_slice(&token_min_a.to_le_bytes());
        data.extend_from_slice(&token_min_b.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(token_program(), false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new(*position, false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn build_collect_fees(&self, position: &Pubkey, pool: &Pubkey, owner: &Pubkey) -> Instruction {
        let accounts = vec![
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new(*position, false),
            AccountMeta::new_readonly(token_program(), false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data: discriminator::COLLECT_FEES.to_vec(),
        }
    }

    fn build_collect_reward(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
        reward_index: u8,
    ) -> Instruction {
        let mut data = Vec::with_capacity(9);
        data.extend_from_slice(&discriminator::COLLECT_REWARD);
        data.push(reward_index);

        let accounts = vec![
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new(*position, false),
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
            AccountMeta::new_readonly(*owner, true), // position_authority
            AccountMeta::new(*owner, false),         // receiver
            AccountMeta::new(*position, false),
        ];

        Instruction {
            program_id: self.program_id,
            accounts,
            data: discriminator::CLOSE_POSITION.to_vec(),
        }
    }
}

impl crate::InstructionProducer for OrcaWhirlpool {
    fn protocol(&self) -> Protocol {
        Protocol::OrcaWhirlpool
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
        let position_mint = self.derive_position_mint(pool, lower, upper);
        let (position, _bump) = Pubkey::find_program_address(
            &[b"position", position_mint.as_ref()],
            &self.program_id,
        );
        Ok(vec![
            self.build_open_position(pool, owner, lower, upper),
            self.build_increase_liquidity(&position, pool, owner, amount_a, amount_b),
        ])
    }

    fn close_position(
        &self,
        position: &Pubkey,
        pool: &Pubkey,
        owner: &Pubkey,
    ) -> Result<Vec<Instruction>> {
        // Withdraw everything, sweep fees, then release the position account.
        Ok(vec![
            self.build_decrease_liquidity(position, pool, owner, u128::MAX, 0, 0),
            self.build_collect_fees(position, pool, owner),
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
            self.build_collect_fees(position, pool, owner),
            self.build_collect_reward(position, pool, owner, 0),
        ])
    }
}
