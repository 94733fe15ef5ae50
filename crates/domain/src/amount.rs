//! Raw ↔ UI amount conversion.
//!
//! Raw token amounts are signed 128-bit integers across the whole keeper:
//! a `u64` token amount never overflows it, and signed deltas (wallet
//! outflow vs inflow) fall out naturally. Fiat/UI values use `Decimal`;
//! floats never touch money paths.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Converts a raw (smallest-unit) amount into its UI representation.
#[must_use]
pub fn raw_to_ui(raw: i128, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(raw, u32::from(decimals).min(28)).normalize()
}

/// Converts a UI amount into raw smallest units, truncating dust below
/// one smallest unit. Out-of-range values saturate to zero.
#[must_use]
pub fn ui_to_raw(ui: Decimal, decimals: u8) -> i128 {
    (ui * Decimal::from(10u64.pow(u32::from(decimals))))
        .trunc()
        .to_i128()
        .unwrap_or(0)
}
