//! Market registry.
//!
//! TTL-cached snapshot of the pool's lending markets from the
//! market-data feed, filtered down to markets the pipeline should scan.

use anyhow::Result;
use flashliq_api::{MarketDataClient, MarketInfo};
use std::time::Duration;
use tracing::debug;

use crate::cache::TtlCache;

/// Drop markets the protocol will not let us touch unless the operator
/// explicitly opts in to the full list.
pub fn filter_markets(markets: Vec<MarketInfo>, include_all: bool) -> Vec<MarketInfo> {
    if include_all {
        return markets;
    }
    markets
        .into_iter()
        .filter(|m| m.is_active && !m.is_frozen)
        .collect()
}

/// Cached view over the market-data feed.
pub struct MarketRegistry {
    client: MarketDataClient,
    cache: TtlCache<Vec<MarketInfo>>,
    include_all: bool,
}

impl MarketRegistry {
    pub fn new(client: MarketDataClient, ttl: Duration, include_all: bool) -> Self {
        Self {
            client,
            cache: TtlCache::new(ttl),
            include_all,
        }
    }

    /// Current market set, refreshed at most once per TTL.
    pub async fn markets(&self) -> Result<Vec<MarketInfo>> {
        let all = self
            .cache
            .get_or_refresh(|| self.client.fetch_markets())
            .await?;
        let markets = filter_markets(all, self.include_all);
        debug!(count = markets.len(), "market registry snapshot");
        Ok(markets)
    }
}
