//! Transient account registry.
//!
//! Transaction-scoped map from token-account address to (mint, owner),
//! populated as initialize/create-account instructions are observed
//! during decode. Short-lived wrapped-SOL accounts exist only inside
//! one transaction and are absent from any persistent index; observing
//! their creation in the trace is the only way to attribute their
//! transfers.

use clmm_keeper_domain::token::known_decimals;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

/// Facts recorded for one observed account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub decimals: Option<u8>,
}

/// Decode-scoped registry; never persisted beyond one summarize call.
#[derive(Debug, Default)]
pub struct TransientAccountRegistry {
    accounts: HashMap<Pubkey, TransientAccount>,
}

impl TransientAccountRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observed initialize/create of `account` for `mint`.
    pub fn record(&mut self, account: Pubkey, mint: Pubkey, owner: Pubkey) {
        let decimals = known_decimals(&mint.to_string());
        self.accounts.insert(
            account,
            TransientAccount {
                mint,
                owner,
                decimals,
            },
        );
    }

    /// Looks up a previously observed account.
    #[must_use]
    pub fn resolve(&self, account: &Pubkey) -> Option<&TransientAccount> {
        self.accounts.get(account)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
