//! Post-execution settlement accounting.
//!
//! Fetches a finalized transaction, decodes its full trace, and folds
//! every token movement into signed per-mint deltas from the initiating
//! wallet's point of view. Both sides of each movement are inspected,
//! so offsetting legs inside one transaction net out and only the true
//! residual remains. Finished summaries are memoized per signature.

use crate::assembler::priority_fee_lamports;
use crate::context::EngineContext;
use crate::decode::{DecodedInstruction, TransientAccountRegistry, decode_transaction};
use crate::error::EngineError;
use crate::oracle::token_price;
use crate::raw::RawTransaction;
use crate::retry::{self, RetryPolicy};
use clmm_keeper_domain::amount::raw_to_ui;
use clmm_keeper_domain::token::{WSOL_MINT, known_decimals};
use clmm_keeper_protocols::decode::InstructionKind;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one finalized transaction did, from the wallet's perspective.
#[derive(Debug, Clone)]
pub struct SettlementSummary {
    pub signature: Signature,
    pub slot: u64,
    /// Total fee paid in lamports, as reported by transaction meta.
    pub fee: u64,
    /// Priority-fee portion of `fee`, reconstructed from the decoded
    /// compute-budget instructions. Zero when no price was set.
    pub priority_fee: u64,
    pub compute_units_consumed: Option<u64>,
    /// Signed raw token deltas keyed by mint; zero residuals are dropped.
    pub per_mint_deltas: BTreeMap<String, i128>,
    /// Fiat value of the deltas, counting unpriced mints as zero.
    pub usd_delta: Decimal,
    /// Mints that moved but could not be priced.
    pub unpriced_mints: Vec<String>,
    /// True when inner-instruction meta never became available and the
    /// deltas may be missing inner movements.
    pub partial: bool,
    /// On-chain error string when the transaction landed but failed.
    /// A failed transaction still pays its fee, but none of its token
    /// movements executed, so no deltas are booked.
    pub error: Option<String>,
    /// The decoded trace, for rendering and inspection.
    pub decoded: Vec<DecodedInstruction>,
}

/// Summarizes `signature`, memoized for the life of the context.
pub async fn summarize(
    ctx: &EngineContext,
    signature: &Signature,
) -> Result<Arc<SettlementSummary>, EngineError> {
    if let Some(cached) = ctx.summaries.get(signature) {
        debug!(%signature, "settlement summary cache hit");
        return Ok(cached.clone());
    }

    // Inner meta can lag the transaction itself on some nodes; retry
    // the fetch briefly before degrading to a flagged partial summary.
    let fetch_policy = RetryPolicy::<RawTransaction>::quick()
        .retry_if(|result| !matches!(result, Ok(raw) if raw.inner_meta_present));
    let raw = retry::execute(&fetch_policy, |_| async {
        ctx.fetcher.fetch(signature).await
    })
    .await?;

    let partial = !raw.inner_meta_present;
    if partial {
        warn!(%signature, "inner instruction meta unavailable, summary is partial");
    }

    let mut registry = TransientAccountRegistry::new();
    let decoded = decode_transaction(&raw, &mut registry);

    // A transaction that landed with an on-chain error paid its fee but
    // executed none of its movements; settling its decoded transfers
    // would book deltas that never happened.
    let (per_mint_deltas, usd_delta, unpriced_mints) = if let Some(err) = &raw.err {
        warn!(%signature, error = %err, "transaction failed on chain, settling fee only");
        (BTreeMap::new(), Decimal::ZERO, Vec::new())
    } else {
        let (deltas, mint_decimals) = accumulate_deltas(&raw, &decoded, &registry);
        let (usd, unpriced) = value_deltas(ctx, &deltas, &mint_decimals).await;
        (deltas, usd, unpriced)
    };

    let summary = Arc::new(SettlementSummary {
        signature: *signature,
        slot: raw.slot,
        fee: raw.fee,
        priority_fee: reconstruct_priority_fee(&decoded, ctx.config.default_compute_limit),
        compute_units_consumed: raw.compute_units_consumed,
        per_mint_deltas,
        usd_delta,
        unpriced_mints,
        partial,
        error: raw.err.clone(),
        decoded,
    });
    info!(
        %signature,
        slot = summary.slot,
        fee = summary.fee,
        usd = %summary.usd_delta,
        mints = summary.per_mint_deltas.len(),
        partial,
        "transaction settled"
    );
    // A partial summary can improve once the node finishes indexing the
    // inner meta; only complete summaries are immutable, so only they
    // are memoized.
    if !partial {
        ctx.summaries.insert(*signature, summary.clone());
    }
    Ok(summary)
}

/// Account facts assembled from meta token balances and the decode-time
/// registry. Meta wins when both know an account; transient wrap
/// accounts that never reached a balance snapshot come from the registry.
struct AccountIndex<'a> {
    wallet: Pubkey,
    meta: HashMap<Pubkey, (Pubkey, Option<Pubkey>, u8)>,
    registry: &'a TransientAccountRegistry,
}

impl<'a> AccountIndex<'a> {
    fn build(raw: &RawTransaction, registry: &'a TransientAccountRegistry) -> Self {
        let mut meta = HashMap::new();
        for info in &raw.token_accounts {
            let Some(address) = raw.account_keys.get(info.account_index) else {
                continue;
            };
            let mint = info.mint.parse::<Pubkey>().unwrap_or_default();
            let owner = info.owner.as_ref().and_then(|o| o.parse::<Pubkey>().ok());
            meta.insert(*address, (mint, owner, info.decimals));
        }
        Self {
            wallet: raw.wallet(),
            meta,
            registry,
        }
    }

    fn token_account(&self, key: &Pubkey) -> Option<(Pubkey, Option<Pubkey>, Option<u8>)> {
        if let Some((mint, owner, decimals)) = self.meta.get(key) {
            return Some((*mint, *owner, Some(*decimals)));
        }
        self.registry
            .resolve(key)
            .map(|t| (t.mint, Some(t.owner), t.decimals))
    }

    /// True when `key` is the wallet itself or a token account it owns.
    fn wallet_side(&self, key: &Pubkey) -> bool {
        if *key == self.wallet {
            return true;
        }
        matches!(self.token_account(key), Some((_, Some(owner), _)) if owner == self.wallet)
    }
}

/// Folds the decoded trace into signed per-mint deltas, collecting
/// per-mint decimals along the way for later valuation.
fn accumulate_deltas(
    raw: &RawTransaction,
    decoded: &[DecodedInstruction],
    registry: &TransientAccountRegistry,
) -> (BTreeMap<String, i128>, HashMap<String, u8>) {
    let index = AccountIndex::build(raw, registry);
    let mut deltas: BTreeMap<String, i128> = BTreeMap::new();
    let mut decimals: HashMap<String, u8> = HashMap::new();

    let mut apply = |mint: &str, signed: i128, known: Option<u8>| {
        *deltas.entry(mint.to_string()).or_insert(0) += signed;
        if let Some(d) = known.or_else(|| known_decimals(mint)) {
            decimals.insert(mint.to_string(), d);
        }
    };

    for top in decoded {
        top.walk(&mut |ix| match &ix.kind {
            InstructionKind::TokenTransfer {
                source,
                destination,
                amount,
                mint,
                ..
            } => {
                let source_info = index.token_account(source);
                let dest_info = index.token_account(destination);
                let resolved_mint = (*mint)
                    .or_else(|| source_info.map(|(m, _, _)| m))
                    .or_else(|| dest_info.map(|(m, _, _)| m));
                let Some(resolved_mint) = resolved_mint else {
                    debug!(%source, %destination, amount, "transfer with unknown mint skipped");
                    return;
                };
                let mint_str = resolved_mint.to_string();
                let known = source_info
                    .and_then(|(_, _, d)| d)
                    .or(dest_info.and_then(|(_, _, d)| d));
                if index.wallet_side(source) {
                    apply(&mint_str, -i128::from(*amount), known);
                }
                if index.wallet_side(destination) {
                    apply(&mint_str, i128::from(*amount), known);
                }
            }
            InstructionKind::TokenMintTo {
                mint,
                destination,
                amount,
            } => {
                if index.wallet_side(destination) {
                    apply(&mint.to_string(), i128::from(*amount), None);
                }
            }
            InstructionKind::TokenBurn {
                account,
                mint,
                amount,
            } => {
                if index.wallet_side(account) {
                    apply(&mint.to_string(), -i128::from(*amount), None);
                }
            }
            InstructionKind::SystemTransfer { from, to, lamports } => {
                // Native moves settle under the wrapped mint; a wallet
                // funding its own wrap account nets to zero here.
                if index.wallet_side(from) {
                    apply(WSOL_MINT, -i128::from(*lamports), None);
                }
                if index.wallet_side(to) {
                    apply(WSOL_MINT, i128::from(*lamports), None);
                }
            }
            InstructionKind::SystemCreateAccount {
                funder,
                account,
                lamports,
            } => {
                if index.wallet_side(funder) {
                    apply(WSOL_MINT, -i128::from(*lamports), None);
                }
                if index.wallet_side(account) {
                    apply(WSOL_MINT, i128::from(*lamports), None);
                }
            }
            _ => {}
        });
    }

    deltas.retain(|_, v| *v != 0);
    (deltas, decimals)
}

/// Values the deltas in fiat. Unpriced or decimal-less mints contribute
/// zero and are reported back to the caller.
async fn value_deltas(
    ctx: &EngineContext,
    deltas: &BTreeMap<String, i128>,
    decimals: &HashMap<String, u8>,
) -> (Decimal, Vec<String>) {
    let mut usd = Decimal::ZERO;
    let mut unpriced = Vec::new();
    for (mint, delta) in deltas {
        let priced = match (token_price(ctx, mint).await, decimals.get(mint)) {
            (Some(price), Some(d)) => {
                usd += price * raw_to_ui(*delta, *d);
                true
            }
            _ => false,
        };
        if !priced {
            unpriced.push(mint.clone());
        }
    }
    (usd, unpriced)
}

/// Rebuilds the priority fee from the decoded compute-budget prefix.
fn reconstruct_priority_fee(decoded: &[DecodedInstruction], default_limit: u32) -> u64 {
    let mut limit = None;
    let mut price = None;
    for ix in decoded {
        match ix.kind {
            InstructionKind::SetComputeUnitLimit { units } => limit = Some(units),
            InstructionKind::SetComputeUnitPrice { micro_lamports } => price = Some(micro_lamports),
            _ => {}
        }
    }
    match price {
        Some(p) => priority_fee_lamports(limit.unwrap_or(default_limit), p),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::raw::{RawInstruction, TokenAccountInfo, TransactionFetcher};
    use async_trait::async_trait;
    use clmm_keeper_domain::token::USDC_MINT;
    use clmm_keeper_protocols::{SYSTEM_PROGRAM, token_program};
    use rust_decimal_macros::dec;
    use solana_client::nonblocking::rpc_client::RpcClient;
    use solana_sdk::signature::Keypair;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn offline_ctx() -> EngineContext {
        let config = EngineConfig {
            price_oracle_url: "http://127.0.0.1:1".to_string(),
            ..EngineConfig::default()
        };
        EngineContext::new(
            Arc::new(RpcClient::new("http://127.0.0.1:1".to_string())),
            Arc::new(Keypair::new()),
            config,
        )
    }

    struct FixtureFetcher {
        raw: RawTransaction,
        fetches: AtomicU32,
    }

    impl FixtureFetcher {
        fn new(raw: RawTransaction) -> Arc<Self> {
            Arc::new(Self {
                raw,
                fetches: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TransactionFetcher for FixtureFetcher {
        async fn fetch(&self, _signature: &Signature) -> Result<RawTransaction, EngineError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.raw.clone())
        }
    }

    struct Fixture {
        keys: Vec<Pubkey>,
        instructions: Vec<RawInstruction>,
        token_accounts: Vec<TokenAccountInfo>,
    }

    impl Fixture {
        fn new(wallet: Pubkey) -> Self {
            Self {
                keys: vec![wallet],
                instructions: Vec::new(),
                token_accounts: Vec::new(),
            }
        }

        fn key(&mut self, key: Pubkey) -> usize {
            match self.keys.iter().position(|k| *k == key) {
                Some(i) => i,
                None => {
                    self.keys.push(key);
                    self.keys.len() - 1
                }
            }
        }

        fn token_account(&mut self, address: Pubkey, mint: &str, owner: Pubkey) -> Pubkey {
            let index = self.key(address);
            self.token_accounts.push(TokenAccountInfo {
                account_index: index,
                mint: mint.to_string(),
                owner: Some(owner.to_string()),
                decimals: known_decimals(mint).unwrap_or(0),
            });
            address
        }

        fn spl_transfer(&mut self, source: Pubkey, destination: Pubkey, amount: u64) {
            let program = self.key(token_program());
            let (s, d, a) = (self.key(source), self.key(destination), self.key(self.keys[0]));
            let mut data = vec![3u8];
            data.extend_from_slice(&amount.to_le_bytes());
            self.instructions.push(RawInstruction {
                program_id_index: program,
                accounts: vec![s, d, a],
                data,
            });
        }

        fn system_transfer(&mut self, from: Pubkey, to: Pubkey, lamports: u64) {
            let program = self.key(*SYSTEM_PROGRAM);
            let (f, t) = (self.key(from), self.key(to));
            let mut data = 2u32.to_le_bytes().to_vec();
            data.extend_from_slice(&lamports.to_le_bytes());
            self.instructions.push(RawInstruction {
                program_id_index: program,
                accounts: vec![f, t],
                data,
            });
        }

        fn initialize_token_account(&mut self, account: Pubkey, mint: Pubkey, owner: Pubkey) {
            let program = self.key(token_program());
            let (a, m, o) = (self.key(account), self.key(mint), self.key(owner));
            self.instructions.push(RawInstruction {
                program_id_index: program,
                accounts: vec![a, m, o],
                data: vec![1u8],
            });
        }

        fn compute_budget(&mut self, limit: u32, price: u64) {
            let program = self.key(*clmm_keeper_protocols::COMPUTE_BUDGET_PROGRAM);
            let mut limit_data = vec![2u8];
            limit_data.extend_from_slice(&limit.to_le_bytes());
            let mut price_data = vec![3u8];
            price_data.extend_from_slice(&price.to_le_bytes());
            self.instructions.push(RawInstruction {
                program_id_index: program,
                accounts: vec![],
                data: limit_data,
            });
            self.instructions.push(RawInstruction {
                program_id_index: program,
                accounts: vec![],
                data: price_data,
            });
        }

        fn build(self, fee: u64, inner_meta_present: bool) -> RawTransaction {
            RawTransaction {
                signature: Signature::from([7u8; 64]),
                slot: 42,
                fee,
                compute_units_consumed: Some(55_000),
                account_keys: self.keys,
                instructions: self.instructions,
                inner_groups: BTreeMap::new(),
                token_accounts: self.token_accounts,
                inner_meta_present,
                err: None,
            }
        }

        fn build_failed(self, fee: u64, err: &str) -> RawTransaction {
            let mut raw = self.build(fee, true);
            raw.err = Some(err.to_string());
            raw
        }
    }

    async fn summarize_fixture(raw: RawTransaction) -> (Arc<SettlementSummary>, Arc<FixtureFetcher>) {
        let fetcher = FixtureFetcher::new(raw);
        let ctx = offline_ctx().with_fetcher(fetcher.clone());
        let signature = Signature::from([7u8; 64]);
        let summary = summarize(&ctx, &signature).await.unwrap();
        (summary, fetcher)
    }

    #[tokio::test(start_paused = true)]
    async fn stable_outflow_values_in_fiat() {
        let wallet = Pubkey::new_unique();
        let mut fx = Fixture::new(wallet);
        let own = fx.token_account(Pubkey::new_unique(), USDC_MINT, wallet);
        let vault = fx.token_account(Pubkey::new_unique(), USDC_MINT, Pubkey::new_unique());
        fx.spl_transfer(own, vault, 5_000_000);

        let (summary, _) = summarize_fixture(fx.build(5_000, true)).await;
        assert_eq!(summary.per_mint_deltas.get(USDC_MINT), Some(&-5_000_000i128));
        assert_eq!(summary.usd_delta, dec!(-5));
        assert!(summary.unpriced_mints.is_empty());
        assert!(!summary.partial);
    }

    #[tokio::test(start_paused = true)]
    async fn offsetting_legs_net_to_the_residual() {
        let wallet = Pubkey::new_unique();
        let mut fx = Fixture::new(wallet);
        let own = fx.token_account(Pubkey::new_unique(), USDC_MINT, wallet);
        let vault = fx.token_account(Pubkey::new_unique(), USDC_MINT, Pubkey::new_unique());
        fx.spl_transfer(own, vault, 9_000_000);
        fx.spl_transfer(vault, own, 8_250_000);

        let (summary, _) = summarize_fixture(fx.build(5_000, true)).await;
        assert_eq!(summary.per_mint_deltas.get(USDC_MINT), Some(&-750_000i128));
    }

    #[tokio::test(start_paused = true)]
    async fn exact_offset_drops_the_mint_entirely() {
        let wallet = Pubkey::new_unique();
        let mut fx = Fixture::new(wallet);
        let own = fx.token_account(Pubkey::new_unique(), USDC_MINT, wallet);
        let vault = fx.token_account(Pubkey::new_unique(), USDC_MINT, Pubkey::new_unique());
        fx.spl_transfer(own, vault, 1_000_000);
        fx.spl_transfer(vault, own, 1_000_000);

        let (summary, _) = summarize_fixture(fx.build(5_000, true)).await;
        assert!(summary.per_mint_deltas.is_empty());
        assert_eq!(summary.usd_delta, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_wrap_account_attributes_to_the_wallet() {
        let wallet = Pubkey::new_unique();
        let wsol = Pubkey::from_str(WSOL_MINT).unwrap();
        let wrap = Pubkey::new_unique();
        let vault = Pubkey::new_unique();

        // Create, fund, and drain a wrap account that never appears in
        // meta token balances.
        let mut fx = Fixture::new(wallet);
        fx.token_account(vault, WSOL_MINT, Pubkey::new_unique());
        fx.system_transfer(wallet, wrap, 2_000_000_000);
        fx.initialize_token_account(wrap, wsol, wallet);
        fx.spl_transfer(wrap, vault, 2_000_000_000);

        let (summary, _) = summarize_fixture(fx.build(5_000, true)).await;
        // Funding nets to zero (wallet to wallet-owned wrap); the drain
        // into the pool vault is the residual.
        assert_eq!(
            summary.per_mint_deltas.get(WSOL_MINT),
            Some(&-2_000_000_000i128)
        );
        // Offline price API: WSOL moved but cannot be valued.
        assert_eq!(summary.unpriced_mints, vec![WSOL_MINT.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn fee_fields_come_from_meta_and_budget_prefix() {
        let wallet = Pubkey::new_unique();
        let mut fx = Fixture::new(wallet);
        fx.compute_budget(200_000, 5_000);

        let (summary, _) = summarize_fixture(fx.build(6_000, true)).await;
        assert_eq!(summary.fee, 6_000);
        assert_eq!(summary.priority_fee, 1_000);
        assert_eq!(summary.compute_units_consumed, Some(55_000));
    }

    #[tokio::test(start_paused = true)]
    async fn no_token_movement_summarizes_to_empty_deltas() {
        let wallet = Pubkey::new_unique();
        let mut fx = Fixture::new(wallet);
        fx.compute_budget(200_000, 1_000);

        let (summary, _) = summarize_fixture(fx.build(5_500, true)).await;
        assert!(summary.per_mint_deltas.is_empty());
        assert_eq!(summary.usd_delta, Decimal::ZERO);
        assert!(summary.unpriced_mints.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transaction_settles_fee_only() {
        let wallet = Pubkey::new_unique();
        let mut fx = Fixture::new(wallet);
        let own = fx.token_account(Pubkey::new_unique(), USDC_MINT, wallet);
        let vault = fx.token_account(Pubkey::new_unique(), USDC_MINT, Pubkey::new_unique());
        fx.spl_transfer(own, vault, 5_000_000);

        let raw = fx.build_failed(5_000, "InstructionError(0, Custom(6017))");
        let (summary, _) = summarize_fixture(raw).await;

        // The transfer was decoded but never executed.
        assert!(summary.per_mint_deltas.is_empty());
        assert_eq!(summary.usd_delta, Decimal::ZERO);
        assert!(summary.unpriced_mints.is_empty());
        assert_eq!(summary.fee, 5_000);
        assert_eq!(
            summary.error.as_deref(),
            Some("InstructionError(0, Custom(6017))")
        );
        assert!(!summary.decoded.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_summarize_is_served_from_the_memo() {
        let wallet = Pubkey::new_unique();
        let mut fx = Fixture::new(wallet);
        let own = fx.token_account(Pubkey::new_unique(), USDC_MINT, wallet);
        let vault = fx.token_account(Pubkey::new_unique(), USDC_MINT, Pubkey::new_unique());
        fx.spl_transfer(own, vault, 1_000_000);

        let fetcher = FixtureFetcher::new(fx.build(5_000, true));
        let ctx = offline_ctx().with_fetcher(fetcher.clone());
        let signature = Signature::from([7u8; 64]);

        let first = summarize(&ctx, &signature).await.unwrap();
        let second = summarize(&ctx, &signature).await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(first.per_mint_deltas, second.per_mint_deltas);
        assert_eq!(ctx.cached_summaries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_inner_meta_retries_then_degrades_to_partial() {
        let wallet = Pubkey::new_unique();
        let fx = Fixture::new(wallet);

        let fetcher = FixtureFetcher::new(fx.build(5_000, false));
        let ctx = offline_ctx().with_fetcher(fetcher.clone());
        let signature = Signature::from([7u8; 64]);

        let summary = summarize(&ctx, &signature).await.unwrap();
        assert!(summary.partial);
        // quick(): max_retries 2, so three fetch attempts before degrading.
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_summary_is_not_memoized() {
        let wallet = Pubkey::new_unique();
        let fx = Fixture::new(wallet);

        let fetcher = FixtureFetcher::new(fx.build(5_000, false));
        let ctx = offline_ctx().with_fetcher(fetcher.clone());
        let signature = Signature::from([7u8; 64]);

        let first = summarize(&ctx, &signature).await.unwrap();
        assert!(first.partial);
        assert_eq!(ctx.cached_summaries(), 0);

        // A later call re-fetches; the node may have indexed the inner
        // meta by then.
        let second = summarize(&ctx, &signature).await.unwrap();
        assert!(second.partial);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 6);
    }
}
