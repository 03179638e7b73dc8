//! Rate-limited, retrying access to the remote ledger.
//!
//! All remote call sites go through [`ChainClient::request`], which owns
//! the retry/backoff/rotation policy. Bulk log queries additionally pass
//! through a serializing gate with its own inter-call delay and hard
//! timeout, since archive endpoints rate-limit that call class far more
//! aggressively than point reads.

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::contracts::{IERC20, IPool, IProtocolDataProvider};

/// Health factor scale used by the pool (wad).
const WAD: f64 = 1e18;

/// Retry and endpoint configuration.
#[derive(Debug, Clone)]
pub struct ChainClientConfig {
    /// Equivalent RPC endpoints, tried in rotation on transient failure.
    pub endpoints: Vec<String>,
    /// Attempts per logical operation (first try included).
    pub max_attempts: u32,
    /// Base backoff delay, doubled per attempt.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Per-attempt timeout for point reads.
    pub request_timeout: Duration,
    /// Minimum delay between two bulk log queries.
    pub log_query_delay: Duration,
    /// Hard timeout for a single bulk log query.
    pub log_query_timeout: Duration,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            max_attempts: 4,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(8),
            request_timeout: Duration::from_secs(10),
            log_query_delay: Duration::from_millis(300),
            log_query_timeout: Duration::from_secs(30),
        }
    }
}

/// Classify an error as transient (safe to retry on another endpoint).
pub fn is_retryable(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("429")
        || msg.contains("too many requests")
        || msg.contains("rate limit")
        || msg.contains("connection reset")
        || msg.contains("connection refused")
        || msg.contains("connection closed")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
        || msg.contains("server error")
        || msg.contains("temporarily unavailable")
}

/// Classify an error as "requested block range too large". These are not
/// transient: the same request will fail again until the range shrinks.
pub fn is_range_too_large(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("block range")
        || msg.contains("range too large")
        || msg.contains("query returned more than")
        || msg.contains("exceeds the limit")
        || msg.contains("too many results")
        || msg.contains("response size")
}

/// Solvency snapshot for one wallet, as reported by the pool.
#[derive(Debug, Clone, Copy)]
pub struct AccountData {
    pub total_collateral_base: U256,
    pub total_debt_base: U256,
    pub health_factor: U256,
}

impl AccountData {
    /// Health factor as a ratio. `None` when the wallet has no debt (the
    /// pool reports uint256::MAX for those, which is noise, not health).
    pub fn health_ratio(&self) -> Option<f64> {
        if self.total_debt_base.is_zero() {
            return None;
        }
        if self.health_factor > U256::from(u128::MAX) {
            return Some(f64::INFINITY);
        }
        let wad: u128 = self.health_factor.to();
        Some(wad as f64 / WAD)
    }
}

/// Rate-limited RPC client with endpoint rotation.
pub struct ChainClient {
    config: ChainClientConfig,
    cursor: AtomicUsize,
    /// Serializes bulk log queries; holds the instant of the last one.
    log_gate: tokio::sync::Mutex<Option<Instant>>,
}

impl ChainClient {
    pub fn new(config: ChainClientConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.endpoints.is_empty(),
            "chain client requires at least one RPC endpoint"
        );
        Ok(Self {
            config,
            cursor: AtomicUsize::new(0),
            log_gate: tokio::sync::Mutex::new(None),
        })
    }

    /// The endpoint the next call will use.
    pub fn active_endpoint(&self) -> String {
        let i = self.cursor.load(Ordering::Relaxed) % self.config.endpoints.len();
        self.config.endpoints[i].clone()
    }

    /// Advance to the next configured endpoint.
    pub fn rotate(&self) {
        self.cursor.fetch_add(1, Ordering::Relaxed);
    }

    /// Run `op` with the central retry policy: per-attempt timeout,
    /// exponential backoff with jitter, endpoint rotation on transient
    /// failure. Non-retryable errors propagate immediately.
    pub async fn request<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;
        for attempt in 0..self.config.max_attempts {
            let url = self.active_endpoint();
            let outcome = tokio::time::timeout(self.config.request_timeout, op(url.clone())).await;
            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => anyhow::anyhow!(
                    "{op_name} timed out after {:?}",
                    self.config.request_timeout
                ),
            };

            if !is_retryable(&err) {
                return Err(err);
            }
            warn!(
                op = op_name,
                attempt,
                endpoint = url,
                error = %err,
                "transient RPC failure, rotating endpoint"
            );
            self.rotate();
            last_err = Some(err);

            if attempt + 1 < self.config.max_attempts {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{op_name}: retry budget exhausted")))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(10));
        let capped = exp.min(self.config.backoff_cap.as_millis() as u64);
        let jitter = rand::thread_rng().gen_range(0..=base);
        Duration::from_millis(capped + jitter)
    }

    /// Bulk log query. Serialized with a minimum inter-call delay and a
    /// hard timeout; a single attempt against the current endpoint. A
    /// transient failure rotates the endpoint before the error surfaces,
    /// so the caller's next try lands elsewhere. Range shrinking and the
    /// retry budget for this call class are owned by the caller.
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let mut last = self.log_gate.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.config.log_query_delay {
                tokio::time::sleep(self.config.log_query_delay - since).await;
            }
        }
        *last = Some(Instant::now());

        let url = self.active_endpoint();
        let filter = filter.clone();
        let result = tokio::time::timeout(self.config.log_query_timeout, async move {
            let provider = ProviderBuilder::new().on_http(url.parse()?);
            Ok::<_, anyhow::Error>(provider.get_logs(&filter).await?)
        })
        .await;

        match result {
            Ok(Ok(logs)) => {
                debug!(count = logs.len(), "bulk log query returned");
                Ok(logs)
            }
            Ok(Err(e)) => {
                if is_retryable(&e) {
                    self.rotate();
                }
                Err(e)
            }
            Err(_) => {
                self.rotate();
                Err(anyhow::anyhow!(
                    "get_logs timed out after {:?}",
                    self.config.log_query_timeout
                ))
            }
        }
    }

    /// Latest block number.
    pub async fn block_number(&self) -> Result<u64> {
        self.request("block_number", |url| async move {
            let provider = ProviderBuilder::new().on_http(url.parse()?);
            Ok(provider.get_block_number().await?)
        })
        .await
    }

    /// Wallet solvency snapshot via `getUserAccountData`.
    pub async fn user_account_data(&self, pool: Address, user: Address) -> Result<AccountData> {
        self.request("user_account_data", |url| async move {
            let provider = ProviderBuilder::new().on_http(url.parse()?);
            let contract = IPool::new(pool, &provider);
            let data = contract.getUserAccountData(user).call().await?;
            Ok(AccountData {
                total_collateral_base: data.totalCollateralBase,
                total_debt_base: data.totalDebtBase,
                health_factor: data.healthFactor,
            })
        })
        .await
    }

    /// Resolve the collateral-receipt and variable-debt token addresses
    /// for an underlying asset.
    pub async fn reserve_tokens(
        &self,
        data_provider: Address,
        asset: Address,
    ) -> Result<(Address, Address)> {
        self.request("reserve_tokens", |url| async move {
            let provider = ProviderBuilder::new().on_http(url.parse()?);
            let contract = IProtocolDataProvider::new(data_provider, &provider);
            let addrs = contract.getReserveTokensAddresses(asset).call().await?;
            Ok((addrs.aTokenAddress, addrs.variableDebtTokenAddress))
        })
        .await
    }

    /// ERC-20 balance lookup.
    pub async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256> {
        self.request("erc20_balance", |url| async move {
            let provider = ProviderBuilder::new().on_http(url.parse()?);
            let contract = IERC20::new(token, &provider);
            Ok(contract.balanceOf(owner).call().await?._0)
        })
        .await
    }

    /// Current base fee and suggested priority fee.
    pub async fn fee_estimate(&self) -> Result<(u128, u128)> {
        self.request("fee_estimate", |url| async move {
            let provider = ProviderBuilder::new().on_http(url.parse()?);
            let block = provider
                .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no latest block"))?;
            let base_fee = block.header.base_fee_per_gas.map(|b| b as u128).unwrap_or(0);
            let priority = provider.get_max_priority_fee_per_gas().await.unwrap_or(0);
            Ok((base_fee, priority))
        })
        .await
    }

    /// State-checking, non-mutating simulation of a full call.
    pub async fn dry_run(&self, tx: &TransactionRequest) -> Result<()> {
        let tx = tx.clone();
        self.request("dry_run", move |url| {
            let tx = tx.clone();
            async move {
                let provider = ProviderBuilder::new().on_http(url.parse()?);
                provider.call(tx).await?;
                Ok(())
            }
        })
        .await
    }

    /// Gas estimate for a call.
    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let tx = tx.clone();
        self.request("estimate_gas", move |url| {
            let tx = tx.clone();
            async move {
                let provider = ProviderBuilder::new().on_http(url.parse()?);
                Ok(provider.estimate_gas(tx).await?)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn client(max_attempts: u32) -> ChainClient {
        ChainClient::new(ChainClientConfig {
            endpoints: vec!["http://a.invalid".into(), "http://b.invalid".into()],
            max_attempts,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(4),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn retryable_classification() {
        assert!(is_retryable(&anyhow::anyhow!("request timed out")));
        assert!(is_retryable(&anyhow::anyhow!("HTTP 429 Too Many Requests")));
        assert!(is_retryable(&anyhow::anyhow!("503 Service Unavailable")));
        assert!(is_retryable(&anyhow::anyhow!("Connection reset by peer")));
        assert!(!is_retryable(&anyhow::anyhow!("execution reverted: 51")));
        assert!(!is_retryable(&anyhow::anyhow!("invalid argument")));
    }

    #[test]
    fn range_too_large_classification() {
        assert!(is_range_too_large(&anyhow::anyhow!(
            "query returned more than 10000 results"
        )));
        assert!(is_range_too_large(&anyhow::anyhow!(
            "block range is too wide"
        )));
        assert!(!is_range_too_large(&anyhow::anyhow!("timed out")));
    }

    #[tokio::test]
    async fn request_rotates_and_retries_transient_errors() {
        let client = client(3);
        let calls = AtomicU32::new(0);

        let result = client
            .request("test_op", |url| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("429 too many requests from {url}")
                    }
                    Ok(url)
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two rotations happened, so the third call saw endpoint index 2 % 2.
        assert_eq!(result, "http://a.invalid");
    }

    #[tokio::test]
    async fn request_propagates_non_retryable_immediately() {
        let client = client(5);
        let calls = AtomicU32::new(0);

        let err = client
            .request("test_op", |_url| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(anyhow::anyhow!("execution reverted")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("reverted"));
    }

    #[tokio::test]
    async fn request_gives_up_after_budget() {
        let client = client(2);
        let err = client
            .request("test_op", |_url| async move {
                Err::<(), _>(anyhow::anyhow!("timeout"))
            })
            .await
            .unwrap_err();
        assert!(is_retryable(&err));
    }

    #[test]
    fn health_ratio_semantics() {
        let zero_debt = AccountData {
            total_collateral_base: U256::from(100),
            total_debt_base: U256::ZERO,
            health_factor: U256::MAX,
        };
        assert!(zero_debt.health_ratio().is_none());

        let under_water = AccountData {
            total_collateral_base: U256::from(90),
            total_debt_base: U256::from(100),
            health_factor: U256::from(900_000_000_000_000_000u128), // 0.9 wad
        };
        let ratio = under_water.health_ratio().unwrap();
        assert!((ratio - 0.9).abs() < 1e-9);
    }
}
