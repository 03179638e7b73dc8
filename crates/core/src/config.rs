//! Configuration with profile support.
//!
//! Tunables live in a TOML profile file with serde defaults so a bare
//! deployment runs on sane values. Endpoints, addresses and the signer
//! key come from the environment; a missing required value is fatal at
//! startup.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Tunable bot parameters, loadable from a TOML profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Borrower discovery parameters
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Health screening parameters
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Opportunity sizing parameters
    #[serde(default)]
    pub sizer: SizerConfig,

    /// Execution coordination parameters
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Gas pricing parameters
    #[serde(default)]
    pub gas: GasConfig,

    /// Pipeline timing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Checkpoint store location
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_profile_name() -> String {
    "default".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("flashliq-state.json")
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            discovery: DiscoveryConfig::default(),
            screener: ScreenerConfig::default(),
            sizer: SizerConfig::default(),
            executor: ExecutorConfig::default(),
            gas: GasConfig::default(),
            pipeline: PipelineConfig::default(),
            store_path: default_store_path(),
        }
    }
}

impl BotConfig {
    /// Load from a TOML profile file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config profile {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config profile {}", path.display()))?
            }
            None => Self::default(),
        };
        info!(profile = %config.profile, "configuration loaded");
        Ok(config)
    }
}

/// Log-scan discovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Blocks to look back when a reserve has no checkpoint
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,

    /// Initial and minimum log-query chunk size
    #[serde(default = "default_chunk_floor")]
    pub chunk_floor: u64,

    /// Maximum log-query chunk size
    #[serde(default = "default_chunk_ceiling")]
    pub chunk_ceiling: u64,

    /// Cap on blocks scanned per reserve per cycle
    #[serde(default = "default_max_blocks_per_run")]
    pub max_blocks_per_run: u64,

    /// Attempts per chunk before a transient failure abandons the scan
    #[serde(default = "default_chunk_attempts")]
    pub chunk_attempts: u32,

    /// Delay between chunk retry attempts, milliseconds (scales linearly
    /// with the attempt number)
    #[serde(default = "default_chunk_retry_delay_ms")]
    pub chunk_retry_delay_ms: u64,

    /// Base reserve cooldown after repeated failures, seconds
    #[serde(default = "default_cooldown_base_secs")]
    pub cooldown_base_secs: u64,

    /// Cooldown cap, seconds
    #[serde(default = "default_cooldown_cap_secs")]
    pub cooldown_cap_secs: u64,

    /// Known-borrower set capacity (oldest evicted beyond this)
    #[serde(default = "default_known_set_cap")]
    pub known_set_cap: usize,

    /// Blocks of recent LiquidationCall events to merge each cycle
    #[serde(default = "default_liquidation_lookback")]
    pub liquidation_lookback: u64,

    /// Max wallets pulled from the distressed feed per cycle
    #[serde(default = "default_distressed_limit")]
    pub distressed_limit: usize,

    /// Include frozen/inactive markets in the scan set
    #[serde(default)]
    pub include_all_markets: bool,
}

fn default_lookback_blocks() -> u64 {
    200_000
}
fn default_chunk_floor() -> u64 {
    500
}
fn default_chunk_ceiling() -> u64 {
    10_000
}
fn default_max_blocks_per_run() -> u64 {
    50_000
}
fn default_chunk_attempts() -> u32 {
    3
}
fn default_chunk_retry_delay_ms() -> u64 {
    500
}
fn default_cooldown_base_secs() -> u64 {
    60
}
fn default_cooldown_cap_secs() -> u64 {
    1800
}
fn default_known_set_cap() -> usize {
    50_000
}
fn default_liquidation_lookback() -> u64 {
    2_000
}
fn default_distressed_limit() -> usize {
    100
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: default_lookback_blocks(),
            chunk_floor: default_chunk_floor(),
            chunk_ceiling: default_chunk_ceiling(),
            max_blocks_per_run: default_max_blocks_per_run(),
            chunk_attempts: default_chunk_attempts(),
            chunk_retry_delay_ms: default_chunk_retry_delay_ms(),
            cooldown_base_secs: default_cooldown_base_secs(),
            cooldown_cap_secs: default_cooldown_cap_secs(),
            known_set_cap: default_known_set_cap(),
            liquidation_lookback: default_liquidation_lookback(),
            distressed_limit: default_distressed_limit(),
            include_all_markets: false,
        }
    }
}

impl DiscoveryConfig {
    pub fn cooldown_base(&self) -> Duration {
        Duration::from_secs(self.cooldown_base_secs)
    }
    pub fn cooldown_cap(&self) -> Duration {
        Duration::from_secs(self.cooldown_cap_secs)
    }
    pub fn chunk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_retry_delay_ms)
    }
}

/// Health screening tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Wallets per concurrent batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Wallets screened per cycle (rotating cursor covers the rest)
    #[serde(default = "default_cycle_budget")]
    pub cycle_budget: usize,

    /// Near-threshold band below 1.0
    #[serde(default = "default_near_band")]
    pub near_band: f64,

    /// Watchlist upper bound above 1.0
    #[serde(default = "default_watch_ceiling")]
    pub watch_ceiling: f64,

    /// Health ratios below this are zombie positions, excluded
    #[serde(default = "default_dust_floor")]
    pub dust_floor: f64,

    /// Size of the lowest-health shortlist handed to sizing
    #[serde(default = "default_lowest_n")]
    pub lowest_n: usize,
}

fn default_batch_size() -> usize {
    25
}
fn default_cycle_budget() -> usize {
    500
}
fn default_near_band() -> f64 {
    0.05
}
fn default_watch_ceiling() -> f64 {
    1.10
}
fn default_dust_floor() -> f64 {
    0.01
}
fn default_lowest_n() -> usize {
    20
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            cycle_budget: default_cycle_budget(),
            near_band: default_near_band(),
            watch_ceiling: default_watch_ceiling(),
            dust_floor: default_dust_floor(),
            lowest_n: default_lowest_n(),
        }
    }
}

/// Opportunity sizing tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizerConfig {
    /// Fraction of debt closable in one call, basis points
    #[serde(default = "default_close_factor_bps")]
    pub close_factor_bps: u64,

    /// Flash loan premium, basis points
    #[serde(default = "default_flash_fee_bps")]
    pub flash_fee_bps: u64,

    /// Minimum debt-to-cover in base-currency units (wei scale).
    /// Kept within u64 so TOML profiles can set it.
    #[serde(default = "default_min_debt_base")]
    pub min_debt_base: u64,

    /// Minimum net profit to act on, basis points of debt covered
    #[serde(default = "default_min_profit_bps")]
    pub min_profit_bps: i64,

    /// Top-N supplies and borrows considered for pair selection
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Swap slippage tolerance, basis points
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
}

fn default_close_factor_bps() -> u64 {
    5_000
}
fn default_flash_fee_bps() -> u64 {
    5
}
fn default_min_debt_base() -> u64 {
    10_000_000_000_000_000 // 0.01 in 18-decimal base units
}
fn default_min_profit_bps() -> i64 {
    10
}
fn default_top_n() -> usize {
    3
}
fn default_slippage_bps() -> u16 {
    50
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            close_factor_bps: default_close_factor_bps(),
            flash_fee_bps: default_flash_fee_bps(),
            min_debt_base: default_min_debt_base(),
            min_profit_bps: default_min_profit_bps(),
            top_n: default_top_n(),
            slippage_bps: default_slippage_bps(),
        }
    }
}

/// Execution coordination tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Concurrent simulation permits
    #[serde(default = "default_max_simulations")]
    pub max_simulations: usize,

    /// Attempts per wallet before the long cooldown kicks in
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cooldown after a failed attempt, seconds
    #[serde(default = "default_short_cooldown_secs")]
    pub short_cooldown_secs: u64,

    /// Cooldown after exhausting retries, seconds
    #[serde(default = "default_long_cooldown_secs")]
    pub long_cooldown_secs: u64,

    /// Gas limit headroom multiplier over the estimate, percent
    #[serde(default = "default_gas_headroom_pct")]
    pub gas_headroom_pct: u64,

    /// Native token USD price hint for the gas cost guard
    #[serde(default)]
    pub native_usd: Option<f64>,

    /// Fallback ceiling on gas spend when no USD pricing is available,
    /// in wei. Kept within u64 so TOML profiles can set it.
    #[serde(default = "default_max_gas_cost_wei")]
    pub max_gas_cost_wei: u64,
}

fn default_max_simulations() -> usize {
    4
}
fn default_max_retries() -> u32 {
    3
}
fn default_short_cooldown_secs() -> u64 {
    30
}
fn default_long_cooldown_secs() -> u64 {
    900
}
fn default_gas_headroom_pct() -> u64 {
    20
}
fn default_max_gas_cost_wei() -> u64 {
    50_000_000_000_000_000 // 0.05 native
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_simulations: default_max_simulations(),
            max_retries: default_max_retries(),
            short_cooldown_secs: default_short_cooldown_secs(),
            long_cooldown_secs: default_long_cooldown_secs(),
            gas_headroom_pct: default_gas_headroom_pct(),
            native_usd: None,
            max_gas_cost_wei: default_max_gas_cost_wei(),
        }
    }
}

impl ExecutorConfig {
    pub fn short_cooldown(&self) -> Duration {
        Duration::from_secs(self.short_cooldown_secs)
    }
    pub fn long_cooldown(&self) -> Duration {
        Duration::from_secs(self.long_cooldown_secs)
    }
}

/// Gas pricing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Floor on the priority fee, wei
    #[serde(default = "default_min_priority_fee_wei")]
    pub min_priority_fee_wei: u64,

    /// Hard cap on the max fee, wei
    #[serde(default = "default_max_fee_cap_wei")]
    pub max_fee_cap_wei: u64,
}

fn default_min_priority_fee_wei() -> u64 {
    1_000_000_000 // 1 gwei
}
fn default_max_fee_cap_wei() -> u64 {
    500_000_000_000 // 500 gwei
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            min_priority_fee_wei: default_min_priority_fee_wei(),
            max_fee_cap_wei: default_max_fee_cap_wei(),
        }
    }
}

/// Pipeline timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Interval between cycle starts, seconds
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
}

fn default_cycle_interval_secs() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

/// Deployment-specific wiring sourced from the environment. All of it
/// is required except the fallback quote and distressed endpoints.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub rpc_urls: Vec<String>,
    pub chain_id: u64,
    pub private_key: String,
    pub pool: Address,
    pub data_provider: Address,
    pub swap_router: Address,
    pub settlement_contract: Address,
    pub profit_receiver: Address,
    pub wrapped_native: Address,
    pub market_feed_url: String,
    pub quote_url: String,
    pub quote_fallback_url: Option<String>,
    pub distressed_feed_url: Option<String>,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required env var {name}"))
}

fn required_address(name: &str) -> Result<Address> {
    required(name)?
        .parse()
        .with_context(|| format!("invalid address in {name}"))
}

impl DeploymentConfig {
    pub fn from_env() -> Result<Self> {
        let rpc_urls: Vec<String> = required("RPC_URLS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        anyhow::ensure!(!rpc_urls.is_empty(), "RPC_URLS contains no endpoints");

        Ok(Self {
            rpc_urls,
            chain_id: required("CHAIN_ID")?.parse().context("invalid CHAIN_ID")?,
            private_key: required("PRIVATE_KEY")?,
            pool: required_address("POOL_ADDRESS")?,
            data_provider: required_address("DATA_PROVIDER_ADDRESS")?,
            swap_router: required_address("SWAP_ROUTER_ADDRESS")?,
            settlement_contract: required_address("SETTLEMENT_CONTRACT_ADDRESS")?,
            profit_receiver: required_address("PROFIT_RECEIVER_ADDRESS")?,
            wrapped_native: required_address("WRAPPED_NATIVE_ADDRESS")?,
            market_feed_url: required("MARKET_FEED_URL")?,
            quote_url: required("QUOTE_URL")?,
            quote_fallback_url: std::env::var("QUOTE_FALLBACK_URL").ok(),
            distressed_feed_url: std::env::var("DISTRESSED_FEED_URL").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BotConfig::default();
        assert_eq!(config.profile, "default");
        assert!(config.discovery.chunk_floor <= config.discovery.chunk_ceiling);
        assert!(config.screener.near_band > 0.0);
        assert_eq!(config.sizer.close_factor_bps, 5_000);
        assert!(config.executor.max_retries > 0);
    }

    #[test]
    fn partial_profile_fills_in_defaults() {
        let raw = r#"
            profile = "aggressive"

            [sizer]
            min_profit_bps = 25
            top_n = 5
            min_debt_base = 20000000000000000

            [executor]
            max_simulations = 8
            max_gas_cost_wei = 100000000000000000
        "#;
        let config: BotConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.profile, "aggressive");
        assert_eq!(config.sizer.min_profit_bps, 25);
        assert_eq!(config.sizer.top_n, 5);
        assert_eq!(config.sizer.min_debt_base, 20_000_000_000_000_000);
        assert_eq!(config.sizer.close_factor_bps, 5_000);
        assert_eq!(config.executor.max_simulations, 8);
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.executor.max_gas_cost_wei, 100_000_000_000_000_000);
        assert_eq!(config.discovery.chunk_floor, 500);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = BotConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let back: BotConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.screener.batch_size, config.screener.batch_size);
        assert_eq!(back.store_path, config.store_path);
        // The wei-scale tunables must survive TOML's integer range.
        assert_eq!(back.sizer.min_debt_base, config.sizer.min_debt_base);
        assert_eq!(back.executor.max_gas_cost_wei, config.executor.max_gas_cost_wei);
        assert_eq!(back.gas.max_fee_cap_wei, config.gas.max_fee_cap_wei);
        assert_eq!(back.gas.min_priority_fee_wei, config.gas.min_priority_fee_wei);
    }
}
