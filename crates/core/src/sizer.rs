//! Opportunity sizing.
//!
//! Turns a liquidatable wallet into a concrete, quoted opportunity:
//! pick a collateral/debt pair, bound the repay amount by the close
//! factor, price the collateral exit with the aggregator and estimate
//! net profit after the flash premium.

use alloy::primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use flashliq_api::{QuoteClient, QuoteRequest, SwapQuote};
use flashliq_chain::ChainClient;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::SizerConfig;
use crate::reserves::Reserve;
use crate::screener::ScreenedWallet;

const BPS: u64 = 10_000;

/// One wallet position in one reserve.
#[derive(Debug, Clone)]
pub struct Position {
    pub asset: Address,
    pub supply: U256,
    pub debt: U256,
}

/// Per-wallet position lookup seam, mocked in tests.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn positions(&self, wallet: Address, reserves: &[Reserve]) -> Result<Vec<Position>>;
}

/// Position source reading receipt- and debt-token balances on chain.
pub struct ChainPositionSource {
    chain: Arc<ChainClient>,
}

impl ChainPositionSource {
    pub fn new(chain: Arc<ChainClient>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl PositionSource for ChainPositionSource {
    async fn positions(&self, wallet: Address, reserves: &[Reserve]) -> Result<Vec<Position>> {
        let queries = reserves.iter().map(|reserve| {
            let chain = self.chain.clone();
            async move {
                let supply = chain.erc20_balance(reserve.collateral_token, wallet).await?;
                let debt = chain.erc20_balance(reserve.debt_token, wallet).await?;
                Ok::<_, anyhow::Error>(Position {
                    asset: reserve.underlying_asset,
                    supply,
                    debt,
                })
            }
        });

        let mut positions = Vec::with_capacity(reserves.len());
        for result in join_all(queries).await {
            let position = result?;
            if position.supply > U256::ZERO || position.debt > U256::ZERO {
                positions.push(position);
            }
        }
        Ok(positions)
    }
}

/// A sized, quoted and profitable liquidation candidate.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub wallet: Address,
    pub collateral_asset: Address,
    pub debt_asset: Address,
    pub debt_to_cover: U256,
    pub seize_estimate: U256,
    pub quote: SwapQuote,
    pub profit_bps: i64,
}

/// Estimated net profit in basis points of the debt covered, after the
/// flash premium. Floored at -10000 (a total loss of the repaid debt).
pub fn profit_bps(amount_out: U256, debt_to_cover: U256, flash_fee_bps: u64) -> i64 {
    if debt_to_cover.is_zero() {
        return -(BPS as i64);
    }
    let owed = debt_to_cover + debt_to_cover * U256::from(flash_fee_bps) / U256::from(BPS);

    if amount_out >= owed {
        let bps = (amount_out - owed) * U256::from(BPS) / debt_to_cover;
        i64::try_from(bps).unwrap_or(i64::MAX)
    } else {
        let bps = (owed - amount_out) * U256::from(BPS) / debt_to_cover;
        -i64::try_from(bps).unwrap_or(i64::MAX).min(BPS as i64)
    }
}

/// Share of an amount closable in one call. The close factor caps it;
/// the amount itself bounds it, so a factor above 100% never sizes past
/// what is actually there.
pub fn close_factor_share(amount: U256, close_factor_bps: u64) -> U256 {
    (amount * U256::from(close_factor_bps) / U256::from(BPS)).min(amount)
}

/// A quote may only execute through the configured router. A zero
/// target means the aggregator left routing to us, which is fine; any
/// other unknown address is a spoofed route.
pub fn target_allowed(execution_target: Address, swap_router: Address) -> bool {
    execution_target == Address::ZERO || execution_target == swap_router
}

/// First distinct-asset (collateral, debt) pair from the top-N supplies
/// and top-N borrows by magnitude.
pub fn select_pair(positions: &[Position], top_n: usize) -> Option<(Position, Position)> {
    let mut supplies: Vec<&Position> = positions.iter().filter(|p| p.supply > U256::ZERO).collect();
    let mut borrows: Vec<&Position> = positions.iter().filter(|p| p.debt > U256::ZERO).collect();
    supplies.sort_by(|a, b| b.supply.cmp(&a.supply));
    borrows.sort_by(|a, b| b.debt.cmp(&a.debt));
    supplies.truncate(top_n);
    borrows.truncate(top_n);

    for supply in &supplies {
        for borrow in &borrows {
            if supply.asset != borrow.asset {
                return Some(((*supply).clone(), (*borrow).clone()));
            }
        }
    }
    None
}

/// Sizes liquidation opportunities for screened wallets.
pub struct OpportunitySizer {
    positions: Arc<dyn PositionSource>,
    quotes: QuoteClient,
    swap_router: Address,
    config: SizerConfig,
}

impl OpportunitySizer {
    pub fn new(
        positions: Arc<dyn PositionSource>,
        quotes: QuoteClient,
        swap_router: Address,
        config: SizerConfig,
    ) -> Self {
        Self {
            positions,
            quotes,
            swap_router,
            config,
        }
    }

    /// Size one candidate. `None` means there is nothing worth doing
    /// for this wallet right now; errors are reserved for position
    /// lookups failing outright.
    #[instrument(skip_all, fields(wallet = %candidate.wallet))]
    pub async fn size(
        &self,
        candidate: &ScreenedWallet,
        reserves: &[Reserve],
    ) -> Result<Option<Opportunity>> {
        let cfg = &self.config;
        let positions = self.positions.positions(candidate.wallet, reserves).await?;

        let Some((supply, borrow)) = select_pair(&positions, cfg.top_n) else {
            debug!("no distinct collateral/debt pair");
            return Ok(None);
        };

        let debt_to_cover = close_factor_share(borrow.debt, cfg.close_factor_bps);
        if debt_to_cover < U256::from(cfg.min_debt_base) {
            debug!(%debt_to_cover, "below minimum debt floor");
            return Ok(None);
        }
        let seize_estimate = close_factor_share(supply.supply, cfg.close_factor_bps);

        let request = QuoteRequest::new(
            supply.asset,
            borrow.asset,
            seize_estimate,
            cfg.slippage_bps,
        );
        let quote = match self.quotes.quote(&request).await {
            Ok(quote) => quote,
            Err(err) => {
                warn!(error = %err, "no usable quote for pair");
                return Ok(None);
            }
        };

        if !target_allowed(quote.execution_target, self.swap_router) {
            warn!(target = %quote.execution_target, "quote targets an unknown router, rejected");
            return Ok(None);
        }

        let profit = profit_bps(quote.amount_out, debt_to_cover, cfg.flash_fee_bps);
        if profit <= 0 || profit < cfg.min_profit_bps {
            debug!(profit_bps = profit, "not profitable enough");
            return Ok(None);
        }

        debug!(
            collateral = %supply.asset,
            debt = %borrow.asset,
            %debt_to_cover,
            profit_bps = profit,
            "opportunity sized"
        );
        Ok(Some(Opportunity {
            wallet: candidate.wallet,
            collateral_asset: supply.asset,
            debt_asset: borrow.asset,
            debt_to_cover,
            seize_estimate,
            quote,
            profit_bps: profit,
        }))
    }
}
