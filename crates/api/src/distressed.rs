//! Distressed-position feed client.
//!
//! Optional analytics endpoint listing wallets already near liquidation.
//! Strictly best-effort: discovery merges whatever comes back and treats
//! any failure as an empty result.

use alloy::primitives::Address;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DistressedEntry {
    wallet: Address,
    #[serde(default)]
    health_factor: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DistressedResponse {
    positions: Vec<DistressedEntry>,
}

/// HTTP client for the distressed-position feed.
#[derive(Debug, Clone)]
pub struct DistressedFeedClient {
    client: reqwest::Client,
    base_url: String,
}

impl DistressedFeedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    /// Fetch up to `limit` distressed wallet addresses, riskiest first.
    /// Failures are logged and collapsed into an empty list.
    #[instrument(skip(self))]
    pub async fn fetch_wallets(&self, limit: usize) -> Vec<Address> {
        match self.try_fetch(limit).await {
            Ok(wallets) => {
                debug!(count = wallets.len(), "distressed feed returned");
                wallets
            }
            Err(err) => {
                warn!(error = %err, "distressed feed unavailable, continuing without it");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, limit: usize) -> Result<Vec<Address>> {
        let url = format!("{}/positions/distressed?limit={}", self.base_url, limit);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: DistressedResponse = response.json().await?;

        let mut entries = body.positions;
        entries.sort_by(|a, b| {
            let ha = a.health_factor.unwrap_or(f64::MAX);
            let hb = b.health_factor.unwrap_or(f64::MAX);
            ha.total_cmp(&hb)
        });
        Ok(entries.into_iter().take(limit).map(|e| e.wallet).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_sorts_riskiest_first() {
        let raw = r#"{
            "positions": [
                {"wallet": "0x0101010101010101010101010101010101010101", "healthFactor": 1.04},
                {"wallet": "0x0202020202020202020202020202020202020202", "healthFactor": 0.98},
                {"wallet": "0x0303030303030303030303030303030303030303"}
            ]
        }"#;
        let body: DistressedResponse = serde_json::from_str(raw).unwrap();
        let mut entries = body.positions;
        entries.sort_by(|a, b| {
            let ha = a.health_factor.unwrap_or(f64::MAX);
            let hb = b.health_factor.unwrap_or(f64::MAX);
            ha.total_cmp(&hb)
        });
        assert_eq!(entries[0].wallet, Address::repeat_byte(2));
        assert_eq!(entries[2].wallet, Address::repeat_byte(3));
    }
}
