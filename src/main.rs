//! Flash-loan liquidation bot.
//!
//! Discovers borrowers on an Aave-style lending pool, screens their
//! health, sizes profitable liquidations and settles them atomically
//! through a flash-loan contract.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flashliq_api::{DistressedFeedClient, MarketDataClient, QuoteClient};
use flashliq_chain::{
    ChainClient, ChainClientConfig, GasPricer, SettlementContract, TransactionSender,
};
use flashliq_core::{
    BorrowerDiscovery, BotConfig, ChainExecutionBackend, ChainPositionSource, CheckpointStore,
    DeploymentConfig, ExecutionCoordinator, HealthScreener, MarketRegistry, OpportunitySizer,
    Pipeline, PoolSolvencyOracle, ReserveIndex,
};

/// TTL for the market list and reserve token index.
const REGISTRY_TTL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,flashliq_core=debug,flashliq_chain=debug")),
        )
        .init();

    let profile_path = std::env::var("BOT_PROFILE").ok();
    let config = BotConfig::load(profile_path.as_deref().map(std::path::Path::new))?;
    let deployment = DeploymentConfig::from_env()?;

    info!(
        profile = %config.profile,
        chain_id = deployment.chain_id,
        pool = %deployment.pool,
        "starting liquidation bot"
    );

    let mut pipeline = build_pipeline(config, deployment).await?;
    pipeline.run().await
}

async fn build_pipeline(config: BotConfig, deployment: DeploymentConfig) -> Result<Pipeline> {
    let chain = Arc::new(ChainClient::new(ChainClientConfig {
        endpoints: deployment.rpc_urls.clone(),
        ..ChainClientConfig::default()
    })?);

    let sender = Arc::new(
        TransactionSender::new(
            &deployment.private_key,
            &deployment.rpc_urls[0],
            deployment.chain_id,
        )
        .await?,
    );
    let operator = sender.address;
    info!(%operator, "signer ready");

    let settlement = Arc::new(SettlementContract::with_sender(
        deployment.settlement_contract,
        sender,
    ));

    let registry = MarketRegistry::new(
        MarketDataClient::new(deployment.market_feed_url.clone()),
        REGISTRY_TTL,
        config.discovery.include_all_markets,
    );
    let reserves = ReserveIndex::new(chain.clone(), deployment.data_provider, REGISTRY_TTL);

    let store = CheckpointStore::load(&config.store_path, config.discovery.known_set_cap)?;

    let distressed = deployment
        .distressed_feed_url
        .clone()
        .map(DistressedFeedClient::new);
    let discovery = BorrowerDiscovery::new(
        chain.clone(),
        distressed,
        deployment.pool,
        config.discovery.clone(),
    );

    let oracle = Arc::new(PoolSolvencyOracle::new(chain.clone(), deployment.pool));
    let screener = HealthScreener::new(oracle.clone(), config.screener.clone());

    let quotes = QuoteClient::new(
        deployment.quote_url.clone(),
        deployment.quote_fallback_url.clone(),
    );
    let sizer = OpportunitySizer::new(
        Arc::new(ChainPositionSource::new(chain.clone())),
        quotes,
        deployment.swap_router,
        config.sizer.clone(),
    );

    let pricer = GasPricer {
        min_priority_fee: u128::from(config.gas.min_priority_fee_wei),
        max_fee_cap: u128::from(config.gas.max_fee_cap_wei),
    };
    let backend = Arc::new(ChainExecutionBackend::new(chain.clone(), settlement));
    let executor = Arc::new(ExecutionCoordinator::new(
        oracle,
        backend,
        deployment.settlement_contract,
        operator,
        deployment.swap_router,
        pricer,
        config.executor.clone(),
    ));

    Ok(Pipeline::new(
        registry, reserves, discovery, screener, sizer, executor, store, config,
    ))
}
