//! Market-data feed client.
//!
//! External collaborator that lists the pool's lending markets with
//! their activity flags and decimals. The registry layer above this
//! client owns caching and filtering; this is a thin typed fetch.

use alloy::primitives::Address;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// One lending market as reported by the feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    pub underlying_asset: Address,
    pub symbol: String,
    pub decimals: u8,
    pub is_active: bool,
    pub is_frozen: bool,
    pub borrowing_enabled: bool,
    #[serde(rename = "usageAsCollateralEnabled")]
    pub collateral_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    markets: Vec<MarketInfo>,
}

/// HTTP client for the market-data feed.
#[derive(Debug, Clone)]
pub struct MarketDataClient {
    client: reqwest::Client,
    base_url: String,
}

impl MarketDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the full market list.
    #[instrument(skip(self))]
    pub async fn fetch_markets(&self) -> Result<Vec<MarketInfo>> {
        let url = format!("{}/markets", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: MarketsResponse = response.json().await?;

        debug!(count = body.markets.len(), "market feed returned");
        anyhow::ensure!(!body.markets.is_empty(), "market feed returned no markets");
        Ok(body.markets)
    }
}
