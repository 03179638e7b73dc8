//! Reserve index.
//!
//! Maps each underlying asset to its protocol token pair (interest
//! bearing collateral token, variable debt token) via the protocol data
//! provider, cached so the pipeline does not re-resolve every cycle.

use alloy::primitives::Address;
use anyhow::Result;
use flashliq_api::MarketInfo;
use flashliq_chain::ChainClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::TtlCache;

/// A lending market with its resolved protocol token pair.
#[derive(Debug, Clone)]
pub struct Reserve {
    pub underlying_asset: Address,
    pub symbol: String,
    pub decimals: u8,
    pub collateral_token: Address,
    pub debt_token: Address,
}

/// Cached asset → token-pair index.
pub struct ReserveIndex {
    chain: Arc<ChainClient>,
    data_provider: Address,
    cache: TtlCache<HashMap<Address, (Address, Address)>>,
}

impl ReserveIndex {
    pub fn new(chain: Arc<ChainClient>, data_provider: Address, ttl: Duration) -> Self {
        Self {
            chain,
            data_provider,
            cache: TtlCache::new(ttl),
        }
    }

    /// Resolve the token pair for every market, skipping assets the
    /// data provider does not know.
    pub async fn resolve(&self, markets: &[MarketInfo]) -> Result<Vec<Reserve>> {
        let assets: Vec<Address> = markets.iter().map(|m| m.underlying_asset).collect();
        let pairs = self
            .cache
            .get_or_refresh(|| self.fetch_pairs(assets))
            .await?;

        let reserves = markets
            .iter()
            .filter_map(|m| {
                let (collateral_token, debt_token) = pairs.get(&m.underlying_asset)?;
                Some(Reserve {
                    underlying_asset: m.underlying_asset,
                    symbol: m.symbol.clone(),
                    decimals: m.decimals,
                    collateral_token: *collateral_token,
                    debt_token: *debt_token,
                })
            })
            .collect();
        Ok(reserves)
    }

    async fn fetch_pairs(&self, assets: Vec<Address>) -> Result<HashMap<Address, (Address, Address)>> {
        let mut pairs = HashMap::with_capacity(assets.len());
        for asset in assets {
            match self.chain.reserve_tokens(self.data_provider, asset).await {
                Ok((collateral_token, debt_token)) => {
                    if debt_token == Address::ZERO {
                        debug!(%asset, "data provider returned no debt token, skipping");
                        continue;
                    }
                    pairs.insert(asset, (collateral_token, debt_token));
                }
                Err(err) => {
                    warn!(%asset, error = %err, "failed to resolve reserve tokens");
                }
            }
        }
        anyhow::ensure!(!pairs.is_empty(), "no reserve token pairs resolved");
        debug!(count = pairs.len(), "reserve index refreshed");
        Ok(pairs)
    }
}
