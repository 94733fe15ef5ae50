//! Price and fee oracles, built on the retry executor.

pub mod fees;
pub mod prices;

pub use fees::{FeeSampler, RpcFeeSampler, estimate_priority_fee};
pub use prices::token_price;
