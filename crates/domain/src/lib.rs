//! Shared value types for the CLMM keeper.
//!
//! Everything here is a plain value: token metadata, raw/UI amount
//! conversion, and the enums the engine and CLI agree on. No I/O.

/// Raw and UI-denominated amounts.
pub mod amount;
/// Shared enums (urgency, protocol, operation kind).
pub mod enums;
/// Token metadata and well-known mints.
pub mod token;

pub use amount::{raw_to_ui, ui_to_raw};
pub use enums::{OperationKind, Protocol, Urgency};
pub use token::{Token, known_decimals, stable_value};
