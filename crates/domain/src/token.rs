//! Token metadata and well-known mint addresses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wrapped SOL mint (native token movements settle against this mint).
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// USDC mint (mainnet).
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// USDT mint (mainnet).
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

/// Number of decimals of the native token.
pub const NATIVE_DECIMALS: u8 = 9;

/// A fungible token identified by its mint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(mint: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            mint: mint.into(),
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Wrapped SOL.
    #[must_use]
    pub fn wsol() -> Self {
        Self::new(WSOL_MINT, "SOL", NATIVE_DECIMALS)
    }

    /// USDC.
    #[must_use]
    pub fn usdc() -> Self {
        Self::new(USDC_MINT, "USDC", 6)
    }
}

/// Decimals for mints the keeper knows without a lookup.
#[must_use]
pub fn known_decimals(mint: &str) -> Option<u8> {
    match mint {
        WSOL_MINT => Some(NATIVE_DECIMALS),
        USDC_MINT | USDT_MINT => Some(6),
        _ => None,
    }
}

/// Symbol for mints the keeper knows without a metadata lookup.
#[must_use]
pub fn known_symbol(mint: &str) -> Option<&'static str> {
    match mint {
        WSOL_MINT => Some("SOL"),
        USDC_MINT => Some("USDC"),
        USDT_MINT => Some("USDT"),
        _ => None,
    }
}

/// Fixed fiat value for stable-pegged mints.
///
/// These short-circuit price lookups: no network call is ever made for them.
#[must_use]
pub fn stable_value(mint: &str) -> Option<Decimal> {
    match mint {
        USDC_MINT | USDT_MINT => Some(Decimal::ONE),
        _ => None,
    }
}
