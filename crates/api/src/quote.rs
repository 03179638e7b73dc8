//! Swap quote client.
//!
//! Asks an off-chain aggregator for a route converting seized collateral
//! back into the borrowed asset. A primary endpoint is tried first and a
//! fallback second; the response carries both the expected output and the
//! ready-to-execute calldata for that route.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A quote request for a single token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: Address,
    pub token_out: Address,
    /// Decimal string, in `token_in` base units.
    pub amount_in: String,
    pub slippage_bps: u16,
}

impl QuoteRequest {
    pub fn new(token_in: Address, token_out: Address, amount_in: U256, slippage_bps: u16) -> Self {
        Self {
            token_in,
            token_out,
            amount_in: amount_in.to_string(),
            slippage_bps,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    amount_out: String,
    #[serde(default)]
    min_amount_out: Option<String>,
    execution_target: Address,
    #[serde(default)]
    calldata: Bytes,
    #[serde(default)]
    amount_out_usd: Option<f64>,
}

/// A priced and executable swap route.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub amount_out: U256,
    pub min_amount_out: U256,
    /// Router the calldata must be sent to. Callers verify this against
    /// their allow-list before using the quote.
    pub execution_target: Address,
    /// Prebuilt route instruction. Empty when the aggregator only priced
    /// the pair and left routing to the caller.
    pub calldata: Bytes,
    /// USD value of the output leg, when the aggregator prices it.
    pub amount_out_usd: Option<f64>,
}

impl TryFrom<RawQuote> for SwapQuote {
    type Error = anyhow::Error;

    fn try_from(raw: RawQuote) -> Result<Self> {
        let amount_out: U256 = raw.amount_out.parse().context("bad amountOut")?;
        let min_amount_out = match raw.min_amount_out {
            Some(s) => s.parse().context("bad minAmountOut")?,
            None => amount_out,
        };
        Ok(Self {
            amount_out,
            min_amount_out,
            execution_target: raw.execution_target,
            calldata: raw.calldata,
            amount_out_usd: raw.amount_out_usd,
        })
    }
}

/// HTTP client for the quote aggregator, with one fallback endpoint.
#[derive(Debug, Clone)]
pub struct QuoteClient {
    client: reqwest::Client,
    primary_url: String,
    fallback_url: Option<String>,
}

impl QuoteClient {
    pub fn new(primary_url: impl Into<String>, fallback_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            primary_url: primary_url.into(),
            fallback_url,
        }
    }

    /// Fetch a quote, falling back to the secondary endpoint if the
    /// primary fails. Both failing is an error for this pair only.
    #[instrument(skip(self, request), fields(token_in = %request.token_in, token_out = %request.token_out))]
    pub async fn quote(&self, request: &QuoteRequest) -> Result<SwapQuote> {
        match self.fetch_from(&self.primary_url, request).await {
            Ok(quote) => Ok(quote),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback_url else {
                    return Err(primary_err);
                };
                warn!(error = %primary_err, "primary quote endpoint failed, trying fallback");
                self.fetch_from(fallback, request)
                    .await
                    .context("fallback quote endpoint failed")
            }
        }
    }

    async fn fetch_from(&self, base_url: &str, request: &QuoteRequest) -> Result<SwapQuote> {
        let url = format!("{}/quote", base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        let raw: RawQuote = response.json().await?;
        let quote = SwapQuote::try_from(raw)?;

        debug!(amount_out = %quote.amount_out, target = %quote.execution_target, "quote received");
        anyhow::ensure!(quote.amount_out > U256::ZERO, "quote returned zero output");
        Ok(quote)
    }
}
