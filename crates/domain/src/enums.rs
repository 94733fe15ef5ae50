//! Enums shared across the keeper crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How aggressively a transaction should bid for inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Urgency {
    /// Field name used by priority-fee estimator APIs.
    #[must_use]
    pub fn as_level(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::VeryHigh => "veryHigh",
        }
    }
}

/// Pool protocol a position lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    OrcaWhirlpool,
    MeteoraDlmm,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::OrcaWhirlpool => write!(f, "orca-whirlpool"),
            Protocol::MeteoraDlmm => write!(f, "meteora-dlmm"),
        }
    }
}

/// Position operation being settled; persisted alongside summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Open,
    Close,
    Rebalance,
    Harvest,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Open => write!(f, "open"),
            OperationKind::Close => write!(f, "close"),
            OperationKind::Rebalance => write!(f, "rebalance"),
            OperationKind::Harvest => write!(f, "harvest"),
        }
    }
}
