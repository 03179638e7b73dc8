//! Pipeline scheduler.
//!
//! Runs the discovery -> screening -> sizing -> execution cycle on a
//! fixed interval. Cycles never overlap: a tick that fires while a
//! cycle is still running is skipped outright, and shutdown waits for
//! the in-flight cycle to finish.

use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::BotConfig;
use crate::discovery::BorrowerDiscovery;
use crate::executor::ExecutionCoordinator;
use crate::markets::MarketRegistry;
use crate::reserves::ReserveIndex;
use crate::screener::HealthScreener;
use crate::sizer::OpportunitySizer;
use crate::store::CheckpointStore;

/// Idle/Running latch. One cycle at a time, ever.
#[derive(Debug, Default)]
pub struct CycleGuard {
    running: AtomicBool,
}

impl CycleGuard {
    pub fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Owns every pipeline stage and the persisted store.
pub struct Pipeline {
    registry: MarketRegistry,
    reserves: ReserveIndex,
    discovery: BorrowerDiscovery,
    screener: HealthScreener,
    sizer: OpportunitySizer,
    executor: Arc<ExecutionCoordinator>,
    store: CheckpointStore,
    guard: Arc<CycleGuard>,
    config: BotConfig,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: MarketRegistry,
        reserves: ReserveIndex,
        discovery: BorrowerDiscovery,
        screener: HealthScreener,
        sizer: OpportunitySizer,
        executor: Arc<ExecutionCoordinator>,
        store: CheckpointStore,
        config: BotConfig,
    ) -> Self {
        Self {
            registry,
            reserves,
            discovery,
            screener,
            sizer,
            executor,
            store,
            guard: Arc::new(CycleGuard::default()),
            config,
        }
    }

    /// Main loop. Returns after ctrl-c or SIGTERM, once any in-flight
    /// cycle has completed and state is persisted.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Main loop against an explicit shutdown future. The future is
    /// armed once before the loop, so a signal delivered while a cycle
    /// is in flight is observed at the next select.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut ticker = interval(self.config.pipeline.cycle_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.pipeline.cycle_interval_secs,
            "pipeline started"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.guard.try_begin() {
                        info!("previous cycle still running, tick skipped");
                        continue;
                    }
                    if let Err(err) = self.run_cycle().await {
                        error!(error = %err, "cycle failed");
                    }
                    self.guard.end();
                }
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        if let Err(err) = self.store.save() {
            error!(error = %err, "final state save failed");
        }
        self.executor.log_counters();
        info!("pipeline stopped");
        Ok(())
    }

    /// One full pass: refresh markets, discover borrowers, screen a
    /// window of the known set, size the worst candidates and hand the
    /// profitable ones to the coordinator.
    #[instrument(skip_all)]
    async fn run_cycle(&mut self) -> Result<()> {
        let markets = self.registry.markets().await?;
        let reserves = self.reserves.resolve(&markets).await?;

        self.discovery.run_cycle(&reserves, &mut self.store).await?;

        let window = self
            .store
            .screening_window(self.config.screener.cycle_budget);
        let report = self.screener.screen(&window).await;

        let candidates: Vec<_> = report
            .lowest
            .iter()
            .filter(|w| w.health_ratio < 1.0)
            .copied()
            .collect();
        debug!(candidates = candidates.len(), "sizing candidates");

        for candidate in &candidates {
            match self.sizer.size(candidate, &reserves).await {
                Ok(Some(opportunity)) => {
                    let outcome = self.executor.attempt(&opportunity).await;
                    debug!(wallet = %candidate.wallet, ?outcome, "attempt finished");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(wallet = %candidate.wallet, error = %err, "sizing failed");
                }
            }
        }

        self.store.save()?;
        self.executor.log_counters();
        Ok(())
    }
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ChainExecutionBackend;
    use crate::screener::PoolSolvencyOracle;
    use crate::sizer::ChainPositionSource;
    use alloy::primitives::Address;
    use flashliq_api::{MarketDataClient, QuoteClient};
    use flashliq_chain::{ChainClient, ChainClientConfig, GasPricer, SettlementContract};
    use std::time::Duration;

    #[test]
    fn guard_admits_one_cycle_at_a_time() {
        let guard = CycleGuard::default();
        assert!(guard.try_begin());
        assert!(guard.is_running());
        assert!(!guard.try_begin());

        guard.end();
        assert!(!guard.is_running());
        assert!(guard.try_begin());
    }

    /// All endpoints point at an unroutable local port, so every cycle
    /// fails fast; the pinned shutdown future must still end the loop.
    #[tokio::test]
    async fn shutdown_future_stops_an_active_loop() {
        let mut config = BotConfig::default();
        config.pipeline.cycle_interval_secs = 1;
        config.store_path = std::env::temp_dir().join(format!(
            "flashliq-pipeline-test-{}-{}.json",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        let chain = Arc::new(
            ChainClient::new(ChainClientConfig {
                endpoints: vec!["http://127.0.0.1:9".into()],
                max_attempts: 1,
                ..Default::default()
            })
            .unwrap(),
        );
        let registry = MarketRegistry::new(
            MarketDataClient::new("http://127.0.0.1:9"),
            Duration::from_secs(60),
            false,
        );
        let reserves = ReserveIndex::new(chain.clone(), Address::ZERO, Duration::from_secs(60));
        let store = CheckpointStore::load(&config.store_path, 100).unwrap();
        let discovery =
            BorrowerDiscovery::new(chain.clone(), None, Address::ZERO, config.discovery.clone());
        let oracle = Arc::new(PoolSolvencyOracle::new(chain.clone(), Address::ZERO));
        let screener = HealthScreener::new(oracle.clone(), config.screener.clone());
        let sizer = OpportunitySizer::new(
            Arc::new(ChainPositionSource::new(chain.clone())),
            QuoteClient::new("http://127.0.0.1:9", None),
            Address::ZERO,
            config.sizer.clone(),
        );
        let backend = Arc::new(ChainExecutionBackend::new(
            chain,
            Arc::new(SettlementContract::new(Address::ZERO)),
        ));
        let executor = Arc::new(ExecutionCoordinator::new(
            oracle,
            backend,
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            GasPricer::default(),
            config.executor.clone(),
        ));
        let mut pipeline = Pipeline::new(
            registry, reserves, discovery, screener, sizer, executor, store, config,
        );

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            pipeline.run_until(tokio::time::sleep(Duration::from_millis(200))),
        )
        .await;
        assert!(result.expect("pipeline ignored shutdown").is_ok());
    }
}
