//! Engine context: the one place holding shared clients and caches.
//!
//! Constructed once at startup and passed by reference to every
//! component; there is no module-level state anywhere in the engine.
//! The two memo caches are populate-only: any two concurrent writers
//! for the same key compute an identical value, so plain concurrent
//! inserts are safe and no eviction is needed for the signature cache.

use crate::config::EngineConfig;
use crate::oracle::fees::{FeeSampler, RpcFeeSampler};
use crate::oracle::prices::PriceEntry;
use crate::raw::{RpcFetcher, TransactionFetcher};
use crate::settle::SettlementSummary;
use crate::submit::{RpcSubmitter, SubmissionRpc};
use dashmap::DashMap;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signature::{Keypair, Signature};
use std::sync::Arc;

/// Shared clients, configuration, and process-lifetime caches.
pub struct EngineContext {
    pub rpc: Arc<RpcClient>,
    pub wallet: Arc<Keypair>,
    pub http: reqwest::Client,
    pub config: EngineConfig,
    /// Signature → settlement memo. Populate-only; finalized content
    /// never changes.
    pub(crate) summaries: DashMap<Signature, Arc<SettlementSummary>>,
    /// Mint/symbol → fiat price memo. Populate-only; entries carry a
    /// fetched-at timestamp but are never evicted (see DESIGN.md).
    pub(crate) prices: DashMap<String, PriceEntry>,
    pub(crate) fetcher: Arc<dyn TransactionFetcher>,
    pub(crate) fee_sampler: Arc<dyn FeeSampler>,
    pub(crate) submitter: Arc<dyn SubmissionRpc>,
}

impl EngineContext {
    /// Builds a context over the shared RPC client and signing wallet.
    #[must_use]
    pub fn new(rpc: Arc<RpcClient>, wallet: Arc<Keypair>, config: EngineConfig) -> Self {
        let fetcher = Arc::new(RpcFetcher::new(rpc.clone()));
        let fee_sampler = Arc::new(RpcFeeSampler::new(rpc.clone()));
        let submitter = Arc::new(RpcSubmitter::new(rpc.clone()));
        Self {
            rpc,
            wallet,
            http: reqwest::Client::new(),
            config,
            summaries: DashMap::new(),
            prices: DashMap::new(),
            fetcher,
            fee_sampler,
            submitter,
        }
    }

    /// Swaps the transaction fetcher; used by tests to count fetches
    /// and replay fixtures.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn TransactionFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Swaps the prioritization-fee sampler; used by tests to feed
    /// fixed samples into the fallback estimator.
    #[must_use]
    pub fn with_fee_sampler(mut self, fee_sampler: Arc<dyn FeeSampler>) -> Self {
        self.fee_sampler = fee_sampler;
        self
    }

    /// Swaps the submission surface; used by tests to script send and
    /// status responses.
    #[must_use]
    pub fn with_submitter(mut self, submitter: Arc<dyn SubmissionRpc>) -> Self {
        self.submitter = submitter;
        self
    }

    /// Number of memoized settlement summaries.
    #[must_use]
    pub fn cached_summaries(&self) -> usize {
        self.summaries.len()
    }
}
