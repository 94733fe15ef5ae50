//! Raw transaction view and fetch seam.
//!
//! [`RawTransaction`] is the engine's flattened view of a finalized
//! transaction: resolved account keys, compiled top-level instructions,
//! inner-instruction groups keyed by top-level index, and the meta the
//! summarizer needs. Fetching goes through the [`TransactionFetcher`]
//! trait so the memoization path can be exercised with a counting test
//! double.

use crate::error::EngineError;
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiInstruction, UiTransactionEncoding,
};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// One compiled instruction with indices into the account key table.
#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub program_id_index: usize,
    pub accounts: Vec<usize>,
    pub data: Vec<u8>,
}

/// Token-account facts reported by transaction meta (pre/post balances).
#[derive(Debug, Clone)]
pub struct TokenAccountInfo {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    pub decimals: u8,
}

/// Flattened view of a fetched transaction.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub signature: Signature,
    pub slot: u64,
    pub fee: u64,
    pub compute_units_consumed: Option<u64>,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<RawInstruction>,
    /// Inner-instruction groups keyed by top-level instruction index.
    pub inner_groups: BTreeMap<usize, Vec<RawInstruction>>,
    /// Meta token balances; the summarizer's fallback account index.
    pub token_accounts: Vec<TokenAccountInfo>,
    /// False when the node had not indexed inner instructions yet.
    pub inner_meta_present: bool,
    /// On-chain failure, if the transaction landed with an error.
    pub err: Option<String>,
}

impl RawTransaction {
    /// The initiating wallet: the fee payer, always the first key.
    #[must_use]
    pub fn wallet(&self) -> Pubkey {
        self.account_keys.first().copied().unwrap_or_default()
    }

    /// Converts an RPC get-transaction response into the flattened view.
    pub fn from_encoded(
        signature: Signature,
        encoded: EncodedConfirmedTransactionWithStatusMeta,
    ) -> Result<Self, EngineError> {
        let slot = encoded.slot;
        let decoded = encoded
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| EngineError::Fatal("undecodable transaction payload".to_string()))?;

        let mut account_keys: Vec<Pubkey> = decoded.message.static_account_keys().to_vec();

        let meta = encoded
            .transaction
            .meta
            .ok_or_else(|| EngineError::Fatal("transaction response carries no meta".to_string()))?;

        // Address-table lookups extend the key space: writable first,
        // readonly after, matching runtime index assignment.
        let loaded: Option<solana_transaction_status::UiLoadedAddresses> =
            Option::from(meta.loaded_addresses.clone());
        if let Some(loaded) = loaded {
            for addr in loaded.writable.iter().chain(loaded.readonly.iter()) {
                let key = Pubkey::from_str(addr)
                    .map_err(|e| EngineError::Fatal(format!("bad loaded address: {e}")))?;
                account_keys.push(key);
            }
        }

        let instructions = decoded
            .message
            .instructions()
            .iter()
            .map(|ix| RawInstruction {
                program_id_index: usize::from(ix.program_id_index),
                accounts: ix.accounts.iter().map(|a| usize::from(*a)).collect(),
                data: ix.data.clone(),
            })
            .collect();

        let inner: Option<Vec<solana_transaction_status::UiInnerInstructions>> =
            Option::from(meta.inner_instructions.clone());
        let inner_meta_present = inner.is_some();
        let mut inner_groups = BTreeMap::new();
        for group in inner.unwrap_or_default() {
            let mut decoded_group = Vec::with_capacity(group.instructions.len());
            for ix in &group.instructions {
                if let UiInstruction::Compiled(c) = ix {
                    decoded_group.push(RawInstruction {
                        program_id_index: usize::from(c.program_id_index),
                        accounts: c.accounts.iter().map(|a| usize::from(*a)).collect(),
                        data: bs58::decode(&c.data).into_vec().map_err(|e| {
                            EngineError::Fatal(format!("bad inner instruction payload: {e}"))
                        })?,
                    });
                }
            }
            inner_groups.insert(usize::from(group.index), decoded_group);
        }

        // Union of pre and post balances: an account emptied and closed
        // within the transaction appears only in pre.
        let mut token_accounts: Vec<TokenAccountInfo> = Vec::new();
        let pre: Option<Vec<solana_transaction_status::UiTransactionTokenBalance>> =
            Option::from(meta.pre_token_balances.clone());
        let post: Option<Vec<solana_transaction_status::UiTransactionTokenBalance>> =
            Option::from(meta.post_token_balances.clone());
        let pre = pre.unwrap_or_default();
        let post = post.unwrap_or_default();
        for balance in pre.iter().chain(post.iter()) {
            let account_index = usize::from(balance.account_index);
            let info = TokenAccountInfo {
                account_index,
                mint: balance.mint.clone(),
                owner: Option::from(balance.owner.clone()),
                decimals: balance.ui_token_amount.decimals,
            };
            match token_accounts
                .iter_mut()
                .find(|t| t.account_index == account_index)
            {
                Some(existing) => *existing = info,
                None => token_accounts.push(info),
            }
        }

        Ok(Self {
            signature,
            slot,
            fee: meta.fee,
            compute_units_consumed: Option::from(meta.compute_units_consumed),
            account_keys,
            instructions,
            inner_groups,
            token_accounts,
            inner_meta_present,
            err: meta.err.map(|e| e.to_string()),
        })
    }
}

/// Seam for fetching finalized transactions.
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    async fn fetch(&self, signature: &Signature) -> Result<RawTransaction, EngineError>;
}

/// Production fetcher over the shared RPC client.
pub struct RpcFetcher {
    rpc: Arc<RpcClient>,
}

impl RpcFetcher {
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl TransactionFetcher for RpcFetcher {
    async fn fetch(&self, signature: &Signature) -> Result<RawTransaction, EngineError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: None,
            max_supported_transaction_version: Some(0),
        };
        let encoded = self
            .rpc
            .get_transaction_with_config(signature, config)
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        RawTransaction::from_encoded(*signature, encoded)
    }
}
