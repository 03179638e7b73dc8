//! Execution coordination.
//!
//! Owns the simulate-then-submit path: per-wallet cooldown and retry
//! bookkeeping, bounded-concurrency dry runs, a single serialized
//! submission slot and the gas profitability guard.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use flashliq_chain::{ChainClient, GasPricer, GasQuote, SettlementContract, SwapStep, Urgency};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::config::ExecutorConfig;
use crate::screener::SolvencyOracle;
use crate::sizer::Opportunity;

/// Simulation, gas and submission seam, mocked in tests.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn simulate(&self, tx: &TransactionRequest) -> Result<()>;
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64>;
    async fn fee_estimate(&self) -> Result<(u128, u128)>;
    async fn submit(&self, calldata: Bytes, gas_limit: u64, gas: GasQuote) -> Result<B256>;
}

/// Backend wired to the live chain client and settlement contract.
pub struct ChainExecutionBackend {
    chain: Arc<ChainClient>,
    settlement: Arc<SettlementContract>,
}

impl ChainExecutionBackend {
    pub fn new(chain: Arc<ChainClient>, settlement: Arc<SettlementContract>) -> Self {
        Self { chain, settlement }
    }
}

#[async_trait]
impl ExecutionBackend for ChainExecutionBackend {
    async fn simulate(&self, tx: &TransactionRequest) -> Result<()> {
        self.chain.dry_run(tx).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.chain.estimate_gas(tx).await
    }

    async fn fee_estimate(&self) -> Result<(u128, u128)> {
        self.chain.fee_estimate().await
    }

    async fn submit(&self, calldata: Bytes, gas_limit: u64, gas: GasQuote) -> Result<B256> {
        self.settlement.submit(calldata, gas_limit, gas).await
    }
}

/// Per-wallet attempt bookkeeping.
#[derive(Debug, Clone, Copy)]
struct AttemptState {
    cooldown_until: Instant,
    retry_count: u32,
}

/// Where an attempt ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    SkippedCooldown,
    SkippedHealthy,
    SkippedGasCost,
    SimulationFailed,
    SubmissionFailed,
    Succeeded(B256),
}

/// Attempt counters, logged once per cycle.
#[derive(Debug, Default)]
pub struct ExecutionCounters {
    pub attempts: AtomicU64,
    pub submitted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub skipped_cooldown: AtomicU64,
}

const BPS: i64 = 10_000;

/// Pool fee tier used when a quote leaves routing to us (0.3%).
const DIRECT_HOP_FEE: u32 = 3_000;

/// Cooldown-aware simulate-then-submit coordinator.
pub struct ExecutionCoordinator {
    oracle: Arc<dyn SolvencyOracle>,
    backend: Arc<dyn ExecutionBackend>,
    settlement: SettlementContract,
    operator: Address,
    swap_router: Address,
    pricer: GasPricer,
    attempts: DashMap<Address, AttemptState>,
    sim_permits: Arc<Semaphore>,
    submit_slot: Arc<Mutex<()>>,
    pub counters: ExecutionCounters,
    config: ExecutorConfig,
}

impl ExecutionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        oracle: Arc<dyn SolvencyOracle>,
        backend: Arc<dyn ExecutionBackend>,
        settlement_address: Address,
        operator: Address,
        swap_router: Address,
        pricer: GasPricer,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            oracle,
            backend,
            settlement: SettlementContract::new(settlement_address),
            operator,
            swap_router,
            pricer,
            attempts: DashMap::new(),
            sim_permits: Arc::new(Semaphore::new(config.max_simulations.max(1))),
            submit_slot: Arc::new(Mutex::new(())),
            counters: ExecutionCounters::default(),
            config,
        }
    }

    /// Run one opportunity through cooldown check, on-chain re-check,
    /// simulation, gas guard and submission.
    #[instrument(skip_all, fields(wallet = %opportunity.wallet, profit_bps = opportunity.profit_bps))]
    pub async fn attempt(&self, opportunity: &Opportunity) -> AttemptOutcome {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        let wallet = opportunity.wallet;

        if let Some(state) = self.attempts.get(&wallet) {
            if Instant::now() < state.cooldown_until {
                self.counters.skipped_cooldown.fetch_add(1, Ordering::Relaxed);
                debug!("wallet in cooldown, skipping");
                return AttemptOutcome::SkippedCooldown;
            }
        }

        // Health can recover between screening and execution.
        match self.oracle.account_data(wallet).await {
            Ok(data) => match data.health_ratio() {
                Some(ratio) if ratio < 1.0 => {}
                _ => {
                    debug!("wallet no longer liquidatable");
                    return AttemptOutcome::SkippedHealthy;
                }
            },
            Err(err) => {
                warn!(error = %err, "re-verification failed, skipping");
                return AttemptOutcome::SkippedHealthy;
            }
        }

        let calldata = self.build_calldata(opportunity);
        let tx = TransactionRequest::default()
            .with_from(self.operator)
            .with_to(self.settlement.address)
            .with_input(calldata.clone());

        {
            // Bounded dry-run fan-out; the permit is held only for the
            // simulation itself.
            let _permit = self.sim_permits.acquire().await;
            if let Err(err) = self.backend.simulate(&tx).await {
                warn!(error = %err, "simulation reverted");
                self.record_failure(wallet);
                return AttemptOutcome::SimulationFailed;
            }
        }

        let gas_limit = match self.backend.estimate_gas(&tx).await {
            Ok(estimate) => estimate.saturating_mul(100 + self.config.gas_headroom_pct) / 100,
            Err(err) => {
                warn!(error = %err, "gas estimation failed");
                self.record_failure(wallet);
                return AttemptOutcome::SimulationFailed;
            }
        };

        let (base_fee, priority) = match self.backend.fee_estimate().await {
            Ok(fees) => fees,
            Err(err) => {
                warn!(error = %err, "fee estimation failed");
                self.record_failure(wallet);
                return AttemptOutcome::SimulationFailed;
            }
        };
        let urgency = Urgency::from_profit_bps(opportunity.profit_bps);
        let gas = self.pricer.quote(base_fee, priority, urgency);

        if !self.gas_covers_profit(gas_limit, &gas, opportunity) {
            warn!(gas_limit, max_fee = gas.max_fee_per_gas, "gas would eat the profit, skipping");
            self.short_cooldown(wallet);
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return AttemptOutcome::SkippedGasCost;
        }

        // One submission in flight at a time, ever.
        let _slot = self.submit_slot.lock().await;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        match self.backend.submit(calldata, gas_limit, gas).await {
            Ok(tx_hash) => {
                info!(%tx_hash, "liquidation landed");
                self.attempts.remove(&wallet);
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                AttemptOutcome::Succeeded(tx_hash)
            }
            Err(err) => {
                warn!(error = %err, "submission failed");
                self.record_failure(wallet);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                AttemptOutcome::SubmissionFailed
            }
        }
    }

    fn build_calldata(&self, opportunity: &Opportunity) -> Bytes {
        // A quote without a prebuilt instruction only priced the pair;
        // describe the hop through the configured router explicitly.
        if opportunity.quote.calldata.is_empty() {
            let hop = SwapStep {
                tokenIn: opportunity.collateral_asset,
                tokenOut: opportunity.debt_asset,
                fee: alloy::primitives::Uint::<24, 1>::from(DIRECT_HOP_FEE),
                amountIn: opportunity.seize_estimate,
                stable: false,
            };
            return self.settlement.encode_liquidate_with_path(
                opportunity.wallet,
                opportunity.collateral_asset,
                opportunity.debt_asset,
                opportunity.debt_to_cover,
                vec![opportunity.collateral_asset, opportunity.debt_asset],
                vec![vec![hop]],
                opportunity.quote.min_amount_out,
            );
        }

        let swap_target = if opportunity.quote.execution_target != Address::ZERO {
            opportunity.quote.execution_target
        } else {
            self.swap_router
        };
        self.settlement.encode_liquidate_with_instruction(
            opportunity.wallet,
            opportunity.collateral_asset,
            opportunity.debt_asset,
            opportunity.debt_to_cover,
            swap_target,
            opportunity.quote.calldata.clone(),
            opportunity.quote.min_amount_out,
        )
    }

    /// True when the estimated profit clears the worst-case gas spend.
    /// With USD pricing on both sides the comparison is direct; without
    /// it, fall back to the configured absolute gas ceiling.
    fn gas_covers_profit(&self, gas_limit: u64, gas: &GasQuote, opportunity: &Opportunity) -> bool {
        match (self.config.native_usd, opportunity.quote.amount_out_usd) {
            (Some(native_usd), Some(out_usd)) => {
                let profit_usd = out_usd * opportunity.profit_bps as f64 / BPS as f64;
                GasPricer::covers_cost(gas_limit, gas, native_usd, profit_usd)
            }
            _ => GasPricer::cost_wei(gas_limit, gas) <= u128::from(self.config.max_gas_cost_wei),
        }
    }

    fn short_cooldown(&self, wallet: Address) {
        let retry_count = self
            .attempts
            .get(&wallet)
            .map(|s| s.retry_count)
            .unwrap_or(0);
        self.attempts.insert(
            wallet,
            AttemptState {
                cooldown_until: Instant::now() + self.config.short_cooldown(),
                retry_count,
            },
        );
    }

    fn record_failure(&self, wallet: Address) {
        let retry_count = self
            .attempts
            .get(&wallet)
            .map(|s| s.retry_count)
            .unwrap_or(0)
            + 1;

        let (cooldown, retry_count) = if retry_count >= self.config.max_retries {
            debug!(%wallet, "retry budget exhausted, long cooldown");
            (self.config.long_cooldown(), 0)
        } else {
            (self.config.short_cooldown(), retry_count)
        };

        self.attempts.insert(
            wallet,
            AttemptState {
                cooldown_until: Instant::now() + cooldown,
                retry_count,
            },
        );
    }

    /// Remaining cooldown for a wallet, for logging.
    pub fn cooldown_remaining(&self, wallet: &Address) -> Option<Duration> {
        self.attempts
            .get(wallet)
            .and_then(|s| s.cooldown_until.checked_duration_since(Instant::now()))
    }

    pub fn log_counters(&self) {
        info!(
            attempts = self.counters.attempts.load(Ordering::Relaxed),
            submitted = self.counters.submitted.load(Ordering::Relaxed),
            succeeded = self.counters.succeeded.load(Ordering::Relaxed),
            failed = self.counters.failed.load(Ordering::Relaxed),
            skipped_cooldown = self.counters.skipped_cooldown.load(Ordering::Relaxed),
            "execution totals"
        );
    }
}
