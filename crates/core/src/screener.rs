//! Health screening.
//!
//! Checks known borrowers' solvency in bounded concurrent batches and
//! buckets them for the sizer. Query failures never classify a wallet;
//! a wallet we could not read is skipped until the next pass.

use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use flashliq_chain::{AccountData, ChainClient};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::ScreenerConfig;

/// Solvency lookup seam, mocked in tests.
#[async_trait]
pub trait SolvencyOracle: Send + Sync {
    async fn account_data(&self, wallet: Address) -> Result<AccountData>;
}

/// Oracle backed by the pool's `getUserAccountData`.
pub struct PoolSolvencyOracle {
    chain: Arc<ChainClient>,
    pool: Address,
}

impl PoolSolvencyOracle {
    pub fn new(chain: Arc<ChainClient>, pool: Address) -> Self {
        Self { chain, pool }
    }
}

#[async_trait]
impl SolvencyOracle for PoolSolvencyOracle {
    async fn account_data(&self, wallet: Address) -> Result<AccountData> {
        self.chain.user_account_data(self.pool, wallet).await
    }
}

/// A screened wallet with its current health ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenedWallet {
    pub wallet: Address,
    pub health_ratio: f64,
}

/// Screening output buckets. `near_threshold` is a monitoring sub-view
/// of wallets just under the liquidation bar; `lowest` is the ranked
/// shortlist handed to sizing.
#[derive(Debug, Default)]
pub struct ScreenReport {
    pub liquidatable: Vec<ScreenedWallet>,
    pub near_threshold: Vec<ScreenedWallet>,
    pub watchlist: Vec<ScreenedWallet>,
    pub lowest: Vec<ScreenedWallet>,
    pub skipped: usize,
    pub zero_debt: usize,
    pub zombies: usize,
}

/// Batched concurrent health screener.
pub struct HealthScreener {
    oracle: Arc<dyn SolvencyOracle>,
    config: ScreenerConfig,
}

impl HealthScreener {
    pub fn new(oracle: Arc<dyn SolvencyOracle>, config: ScreenerConfig) -> Self {
        Self { oracle, config }
    }

    /// Screen `wallets` in fixed-size batches. Every query inside a
    /// batch runs concurrently; the next batch starts only after the
    /// whole batch settles.
    #[instrument(skip_all, fields(wallets = wallets.len()))]
    pub async fn screen(&self, wallets: &[Address]) -> ScreenReport {
        let mut report = ScreenReport::default();
        let mut screened: Vec<ScreenedWallet> = Vec::new();

        for batch in wallets.chunks(self.config.batch_size.max(1)) {
            let queries = batch.iter().map(|&wallet| {
                let oracle = self.oracle.clone();
                async move { (wallet, oracle.account_data(wallet).await) }
            });

            for (wallet, result) in join_all(queries).await {
                match result {
                    Ok(data) => {
                        self.classify(wallet, &data, &mut report, &mut screened);
                    }
                    Err(err) => {
                        warn!(%wallet, error = %err, "solvency query failed, skipping");
                        report.skipped += 1;
                    }
                }
            }
        }

        screened.sort_by(|a, b| a.health_ratio.total_cmp(&b.health_ratio));
        screened.truncate(self.config.lowest_n);
        report.lowest = screened;

        info!(
            liquidatable = report.liquidatable.len(),
            watchlist = report.watchlist.len(),
            skipped = report.skipped,
            zero_debt = report.zero_debt,
            zombies = report.zombies,
            "screening pass done"
        );
        report
    }

    fn classify(
        &self,
        wallet: Address,
        data: &AccountData,
        report: &mut ScreenReport,
        screened: &mut Vec<ScreenedWallet>,
    ) {
        let Some(ratio) = data.health_ratio() else {
            report.zero_debt += 1;
            return;
        };
        if ratio < self.config.dust_floor {
            debug!(%wallet, ratio, "zombie position excluded");
            report.zombies += 1;
            return;
        }

        let entry = ScreenedWallet {
            wallet,
            health_ratio: ratio,
        };
        screened.push(entry);

        if ratio < 1.0 {
            report.liquidatable.push(entry);
            if ratio >= 1.0 - self.config.near_band {
                report.near_threshold.push(entry);
            }
        } else if ratio < self.config.watch_ceiling {
            report.watchlist.push(entry);
        }
    }
}
