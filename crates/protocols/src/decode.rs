//! Tagged instruction classification.
//!
//! Maps (program id, discriminator) to a strongly typed
//! [`InstructionKind`]. Unknown combinations classify as
//! [`InstructionKind::Unrecognized`] rather than failing; the engine
//! records those with their raw payload and moves on.

use crate::{
    ASSOCIATED_TOKEN_PROGRAM, COMPUTE_BUDGET_PROGRAM, SYSTEM_PROGRAM, meteora, orca,
    token_program,
};
use clmm_keeper_domain::Protocol;
use solana_sdk::pubkey::Pubkey;

/// Pool-level operation a CLMM program instruction performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOp {
    OpenPosition,
    ClosePosition,
    IncreaseLiquidity,
    DecreaseLiquidity,
    CollectFees,
    CollectReward,
    Swap,
}

/// Decoded meaning of a single on-chain instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// SPL token transfer; `mint` is present only for `TransferChecked`.
    TokenTransfer {
        source: Pubkey,
        destination: Pubkey,
        authority: Pubkey,
        amount: u64,
        mint: Option<Pubkey>,
    },
    TokenMintTo {
        mint: Pubkey,
        destination: Pubkey,
        amount: u64,
    },
    TokenBurn {
        account: Pubkey,
        mint: Pubkey,
        amount: u64,
    },
    /// Any of the InitializeAccount{,2,3} variants.
    InitializeTokenAccount {
        account: Pubkey,
        mint: Pubkey,
        owner: Pubkey,
    },
    CloseTokenAccount {
        account: Pubkey,
        destination: Pubkey,
        owner: Pubkey,
    },
    SyncNative {
        account: Pubkey,
    },
    SystemCreateAccount {
        funder: Pubkey,
        account: Pubkey,
        lamports: u64,
    },
    SystemTransfer {
        from: Pubkey,
        to: Pubkey,
        lamports: u64,
    },
    CreateAssociatedTokenAccount {
        funder: Pubkey,
        account: Pubkey,
        owner: Pubkey,
        mint: Pubkey,
    },
    SetComputeUnitLimit {
        units: u32,
    },
    SetComputeUnitPrice {
        micro_lamports: u64,
    },
    Pool {
        protocol: Protocol,
        op: PoolOp,
    },
    Unrecognized,
}

impl InstructionKind {
    /// Short name for logs and decoded-tree rendering.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            InstructionKind::TokenTransfer { .. } => "token_transfer",
            InstructionKind::TokenMintTo { .. } => "token_mint_to",
            InstructionKind::TokenBurn { .. } => "token_burn",
            InstructionKind::InitializeTokenAccount { .. } => "initialize_token_account",
            InstructionKind::CloseTokenAccount { .. } => "close_token_account",
            InstructionKind::SyncNative { .. } => "sync_native",
            InstructionKind::SystemCreateAccount { .. } => "system_create_account",
            InstructionKind::SystemTransfer { .. } => "system_transfer",
            InstructionKind::CreateAssociatedTokenAccount { .. } => "create_associated_token_account",
            InstructionKind::SetComputeUnitLimit { .. } => "set_compute_unit_limit",
            InstructionKind::SetComputeUnitPrice { .. } => "set_compute_unit_price",
            InstructionKind::Pool { op, .. } => match op {
                PoolOp::OpenPosition => "open_position",
                PoolOp::ClosePosition => "close_position",
                PoolOp::IncreaseLiquidity => "increase_liquidity",
                PoolOp::DecreaseLiquidity => "decrease_liquidity",
                PoolOp::CollectFees => "collect_fees",
                PoolOp::CollectReward => "collect_reward",
                PoolOp::Swap => "swap",
            },
            InstructionKind::Unrecognized => "unrecognized",
        }
    }
}

/// Classifies one instruction given its resolved account list.
#[must_use]
pub fn classify(program_id: &Pubkey, accounts: &[Pubkey], data: &[u8]) -> InstructionKind {
    if *program_id == token_program() {
        classify_token(accounts, data)
    } else if *program_id == *SYSTEM_PROGRAM {
        classify_system(accounts, data)
    } else if *program_id == *ASSOCIATED_TOKEN_PROGRAM {
        classify_ata(accounts, data)
    } else if *program_id == *COMPUTE_BUDGET_PROGRAM {
        classify_compute_budget(data)
    } else if *program_id == *orca::WHIRLPOOL_PROGRAM {
        classify_pool(Protocol::OrcaWhirlpool, data)
    } else if *program_id == *meteora::DLMM_PROGRAM {
        classify_pool(Protocol::MeteoraDlmm, data)
    } else {
        InstructionKind::Unrecognized
    }
}

fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}

fn read_pubkey(data: &[u8], offset: usize) -> Option<Pubkey> {
    data.get(offset..offset + 32)
        .map(|b| Pubkey::new_from_array(b.try_into().unwrap()))
}

fn classify_token(accounts: &[Pubkey], data: &[u8]) -> InstructionKind {
    let Some(&tag) = data.first() else {
        return InstructionKind::Unrecognized;
    };
    match tag {
        // InitializeAccount: [account, mint, owner, rent]
        1 => match (accounts.first(), accounts.get(1), accounts.get(2)) {
            (Some(account), Some(mint), Some(owner)) => InstructionKind::InitializeTokenAccount {
                account: *account,
                mint: *mint,
                owner: *owner,
            },
            _ => InstructionKind::Unrecognized,
        },
        // Transfer { amount }: [source, destination, authority]
        3 => match (
            accounts.first(),
            accounts.get(1),
            accounts.get(2),
            read_u64_le(data, 1),
        ) {
            (Some(source), Some(destination), Some(authority), Some(amount)) => {
                InstructionKind::TokenTransfer {
                    source: *source,
                    destination: *destination,
                    authority: *authority,
                    amount,
                    mint: None,
                }
            }
            _ => InstructionKind::Unrecognized,
        },
        // MintTo { amount }: [mint, account, authority]
        7 => match (accounts.first(), accounts.get(1), read_u64_le(data, 1)) {
            (Some(mint), Some(destination), Some(amount)) => InstructionKind::TokenMintTo {
                mint: *mint,
                destination: *destination,
                amount,
            },
            _ => InstructionKind::Unrecognized,
        },
        // Burn { amount }: [account, mint, authority]
        8 => match (accounts.first(), accounts.get(1), read_u64_le(data, 1)) {
            (Some(account), Some(mint), Some(amount)) => InstructionKind::TokenBurn {
                account: *account,
                mint: *mint,
                amount,
            },
            _ => InstructionKind::Unrecognized,
        },
        // CloseAccount: [account, destination, owner]
        9 => match (accounts.first(), accounts.get(1), accounts.get(2)) {
            (Some(account), Some(destination), Some(owner)) => InstructionKind::CloseTokenAccount {
                account: *account,
                destination: *destination,
                owner: *owner,
            },
            _ => InstructionKind::Unrecognized,
        },
        // TransferChecked { amount, decimals }: [source, mint, destination, authority]
        12 => match (
            accounts.first(),
            accounts.get(1),
            accounts.get(2),
            accounts.get(3),
            read_u64_le(data, 1),
        ) {
            (Some(source), Some(mint), Some(destination), Some(authority), Some(amount)) => {
                InstructionKind::TokenTransfer {
                    source: *source,
                    destination: *destination,
                    authority: *authority,
                    amount,
                    mint: Some(*mint),
                }
            }
            _ => InstructionKind::Unrecognized,
        },
        // InitializeAccount2 / InitializeAccount3: owner in data, [account, mint]
        16 | 18 => match (accounts.first(), accounts.get(1), read_pubkey(data, 1)) {
            (Some(account), Some(mint), Some(owner)) => InstructionKind::InitializeTokenAccount {
                account: *account,
                mint: *mint,
                owner,
            },
            _ => InstructionKind::Unrecognized,
        },
        // SyncNative: [account]
        17 => match accounts.first() {
            Some(account) => InstructionKind::SyncNative { account: *account },
            None => InstructionKind::Unrecognized,
        },
        _ => InstructionKind::Unrecognized,
    }
}

fn classify_system(accounts: &[Pubkey], data: &[u8]) -> InstructionKind {
    let Some(tag) = read_u32_le(data, 0) else {
        return InstructionKind::Unrecognized;
    };
    match tag {
        // CreateAccount { lamports, space, owner }: [funder, new_account]
        0 => match (accounts.first(), accounts.get(1), read_u64_le(data, 4)) {
            (Some(funder), Some(account), Some(lamports)) => InstructionKind::SystemCreateAccount {
                funder: *funder,
                account: *account,
                lamports,
            },
            _ => InstructionKind::Unrecognized,
        },
        // Transfer { lamports }: [from, to]
        2 => match (accounts.first(), accounts.get(1), read_u64_le(data, 4)) {
            (Some(from), Some(to), Some(lamports)) => InstructionKind::SystemTransfer {
                from: *from,
                to: *to,
                lamports,
            },
            _ => InstructionKind::Unrecognized,
        },
        _ => InstructionKind::Unrecognized,
    }
}

fn classify_ata(accounts: &[Pubkey], data: &[u8]) -> InstructionKind {
    // Create (empty data or tag 0) and CreateIdempotent (tag 1):
    // [funder, ata, owner, mint, system_program, token_program]
    let is_create = data.is_empty() || data[0] <= 1;
    if !is_create {
        return InstructionKind::Unrecognized;
    }
    match (
        accounts.first(),
        accounts.get(1),
        accounts.get(2),
        accounts.get(3),
    ) {
        (Some(funder), Some(account), Some(owner), Some(mint)) => {
            InstructionKind::CreateAssociatedTokenAccount {
                funder: *funder,
                account: *account,
                owner: *owner,
                mint: *mint,
            }
        }
        _ => InstructionKind::Unrecognized,
    }
}

fn classify_compute_budget(data: &[u8]) -> InstructionKind {
    match data.first() {
        Some(2) => match read_u32_le(data, 1) {
            Some(units) => InstructionKind::SetComputeUnitLimit { units },
            None => InstructionKind::Unrecognized,
        },
        Some(3) => match read_u64_le(data, 1) {
            Some(micro_lamports) => InstructionKind::SetComputeUnitPrice { micro_lamports },
            None => InstructionKind::Unrecognized,
        },
        _ => InstructionKind::Unrecognized,
    }
}

fn classify_pool(protocol: Protocol, data: &[u8]) -> InstructionKind {
    let Some(disc) = data.get(..8) else {
        return InstructionKind::Unrecognized;
    };
    let op = match protocol {
        Protocol::OrcaWhirlpool => match disc {
            d if d == orca::discriminator::OPEN_POSITION => Some(PoolOp::OpenPosition),
            d if d == orca::discriminator::CLOSE_POSITION => Some(PoolOp::ClosePosition),
            d if d == orca::discriminator::INCREASE_LIQUIDITY => Some(PoolOp::IncreaseLiquidity),
            d if d == orca::discriminator::DECREASE_LIQUIDITY => Some(PoolOp::DecreaseLiquidity),
            d if d == orca::discriminator::COLLECT_FEES => Some(PoolOp::CollectFees),
            d if d == orca::discriminator::COLLECT_REWARD => Some(PoolOp::CollectReward),
            d if d == orca::discriminator::SWAP => Some(PoolOp::Swap),
            _ => None,
        },
        Protocol::MeteoraDlmm => match disc {
            d if d == meteora::discriminator::INITIALIZE_POSITION => Some(PoolOp::OpenPosition),
            d if d == meteora::discriminator::CLOSE_POSITION => Some(PoolOp::ClosePosition),
            d if d == meteora::discriminator::ADD_LIQUIDITY => Some(PoolOp::IncreaseLiquidity),
            d if d == meteora::discriminator::REMOVE_LIQUIDITY => Some(PoolOp::DecreaseLiquidity),
            d if d == meteora::discriminator::CLAIM_FEE => Some(PoolOp::CollectFees),
            d if d == meteora::discriminator::CLAIM_REWARD => Some(PoolOp::CollectReward),
            _ => None,
        },
    };
    match op {
        Some(op) => InstructionKind::Pool { protocol, op },
        None => InstructionKind::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_spl_transfer() {
        let source = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let mut data = vec![3u8];
        data.extend_from_slice(&42u64.to_le_bytes());

        let kind = classify(
            &token_program(),
            &[source, destination, authority],
            &data,
        );
        assert_eq!(
            kind,
            InstructionKind::TokenTransfer {
                source,
                destination,
                authority,
                amount: 42,
                mint: None,
            }
        );
    }

    #[test]
    fn classifies_initialize_account3_with_owner_in_data() {
        let account = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mut data = vec![18u8];
        data.extend_from_slice(owner.as_ref());

        let kind = classify(&token_program(), &[account, mint], &data);
        assert_eq!(
            kind,
            InstructionKind::InitializeTokenAccount {
                account,
                mint,
                owner
            }
        );
    }

    #[test]
    fn classifies_system_transfer() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&1_000u64.to_le_bytes());

        let kind = classify(&SYSTEM_PROGRAM, &[from, to], &data);
        assert_eq!(
            kind,
            InstructionKind::SystemTransfer {
                from,
                to,
                lamports: 1_000
            }
        );
    }

    #[test]
    fn classifies_compute_budget_price_and_limit() {
        let mut limit = vec![2u8];
        limit.extend_from_slice(&200_000u32.to_le_bytes());
        let mut price = vec![3u8];
        price.extend_from_slice(&5_000u64.to_le_bytes());

        assert_eq!(
            classify(&COMPUTE_BUDGET_PROGRAM, &[], &limit),
            InstructionKind::SetComputeUnitLimit { units: 200_000 }
        );
        assert_eq!(
            classify(&COMPUTE_BUDGET_PROGRAM, &[], &price),
            InstructionKind::SetComputeUnitPrice {
                micro_lamports: 5_000
            }
        );
    }

    #[test]
    fn classifies_whirlpool_decrease_liquidity() {
        let mut data = orca::discriminator::DECREASE_LIQUIDITY.to_vec();
        data.extend_from_slice(&[0u8; 32]);

        let kind = classify(&orca::WHIRLPOOL_PROGRAM, &[], &data);
        assert_eq!(
            kind,
            InstructionKind::Pool {
                protocol: Protocol::OrcaWhirlpool,
                op: PoolOp::DecreaseLiquidity
            }
        );
    }

    #[test]
    fn unknown_program_is_unrecognized_not_an_error() {
        let kind = classify(&Pubkey::new_unique(), &[], &[1, 2, 3]);
        assert_eq!(kind, InstructionKind::Unrecognized);
    }

    #[test]
    fn truncated_payload_is_unrecognized() {
        // Transfer tag but amount bytes missing.
        let kind = classify(&token_program(), &[Pubkey::new_unique()], &[3u8, 1, 2]);
        assert_eq!(kind, InstructionKind::Unrecognized);
    }
}
