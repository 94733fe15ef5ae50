//! Program error tables.
//!
//! Maps numeric custom error codes from the pool programs to symbolic
//! names so call sites can write retry policies against names rather
//! than magic numbers. The tables cover the error families the keeper's
//! operations can actually hit; anything else decodes to `Custom(<code>)`.

use crate::{meteora, orca};
use solana_sdk::pubkey::Pubkey;

/// One entry of a program's error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramErrorInfo {
    pub code: u32,
    pub name: &'static str,
    pub message: &'static str,
}

const WHIRLPOOL_ERRORS: &[ProgramErrorInfo] = &[
    ProgramErrorInfo {
        code: 6000,
        name: "InvalidEnum",
        message: "Enum value could not be converted",
    },
    ProgramErrorInfo {
        code: 6001,
        name: "InvalidStartTick",
        message: "Invalid start tick index provided",
    },
    ProgramErrorInfo {
        code: 6005,
        name: "ClosePositionNotEmpty",
        message: "Position is not empty; it cannot be closed",
    },
    ProgramErrorInfo {
        code: 6012,
        name: "LiquidityZero",
        message: "Liquidity amount must be greater than zero",
    },
    ProgramErrorInfo {
        code: 6017,
        name: "TokenMaxExceeded",
        message: "Exceeded token max",
    },
    ProgramErrorInfo {
        code: 6018,
        name: "TokenMinSubceeded",
        message: "Did not meet token min",
    },
    ProgramErrorInfo {
        code: 6035,
        name: "InvalidTimestampConversion",
        message: "Unable to downcast number to u64",
    },
    ProgramErrorInfo {
        code: 6036,
        name: "InvalidTimestamp",
        message: "Provided timestamp is not in order with the pool state",
    },
    ProgramErrorInfo {
        code: 6040,
        name: "InvalidSqrtPriceLimitDirection",
        message: "Provided sqrt price limit is on the wrong side of current price",
    },
];

const DLMM_ERRORS: &[ProgramErrorInfo] = &[
    ProgramErrorInfo {
        code: 6000,
        name: "InvalidStartBinIndex",
        message: "Invalid start bin index",
    },
    ProgramErrorInfo {
        code: 6001,
        name: "InvalidBinId",
        message: "Invalid bin id",
    },
    ProgramErrorInfo {
        code: 6004,
        name: "ExceededAmountSlippageTolerance",
        message: "Exceeded amount slippage tolerance",
    },
    ProgramErrorInfo {
        code: 6005,
        name: "ExceededBinSlippageTolerance",
        message: "Exceeded bin slippage tolerance",
    },
    ProgramErrorInfo {
        code: 6009,
        name: "ZeroLiquidity",
        message: "Zero liquidity",
    },
    ProgramErrorInfo {
        code: 6030,
        name: "StaleOraclePrice",
        message: "Oracle price observation is stale",
    },
];

/// Looks up a custom error code in the target program's error table.
#[must_use]
pub fn lookup(program_id: &Pubkey, code: u32) -> Option<&'static ProgramErrorInfo> {
    let table: &[ProgramErrorInfo] = if *program_id == *orca::WHIRLPOOL_PROGRAM {
        WHIRLPOOL_ERRORS
    } else if *program_id == *meteora::DLMM_PROGRAM {
        DLMM_ERRORS
    } else {
        return None;
    };
    table.iter().find(|e| e.code == code)
}
