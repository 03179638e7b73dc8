//! Borrower discovery.
//!
//! Finds wallets that have ever borrowed by scanning debt-token issuance
//! events (Transfer from the zero address) reserve by reserve, resuming
//! from persisted checkpoints. Recent pool liquidations and the
//! distressed feed are merged on top each cycle.

use alloy::primitives::{Address, B256};
use alloy::rpc::types::{Filter, Log};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use flashliq_api::DistressedFeedClient;
use flashliq_chain::{events, is_range_too_large, is_retryable, ChainClient};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::DiscoveryConfig;
use crate::reserves::Reserve;
use crate::store::{CheckpointStore, ScanCheckpoint};

/// Chain log access as discovery needs it. Split out so scan logic is
/// testable against scripted logs.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn latest_block(&self) -> Result<u64>;
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>>;
}

#[async_trait]
impl LogSource for ChainClient {
    async fn latest_block(&self) -> Result<u64> {
        self.block_number().await
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.get_logs(filter).await
    }
}

/// Event-scan borrower discovery with adaptive chunking.
pub struct BorrowerDiscovery {
    source: Arc<dyn LogSource>,
    distressed: Option<DistressedFeedClient>,
    pool: Address,
    config: DiscoveryConfig,
}

impl BorrowerDiscovery {
    pub fn new(
        source: Arc<dyn LogSource>,
        distressed: Option<DistressedFeedClient>,
        pool: Address,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            source,
            distressed,
            pool,
            config,
        }
    }

    /// One discovery pass over every eligible reserve plus the
    /// unconditional merges. Returns the number of new borrowers.
    #[instrument(skip_all, fields(reserves = reserves.len()))]
    pub async fn run_cycle(
        &self,
        reserves: &[Reserve],
        store: &mut CheckpointStore,
    ) -> Result<usize> {
        let latest = self.source.latest_block().await?;
        let mut added = 0;

        for reserve in reserves {
            let now = Utc::now();
            if let Some(cp) = store.checkpoint(&reserve.underlying_asset) {
                if cp.in_cooldown(now) {
                    debug!(symbol = %reserve.symbol, "reserve in cooldown, skipping");
                    continue;
                }
            }
            added += self.scan_reserve(reserve, latest, store).await;
        }

        added += self.merge_recent_liquidations(latest, store).await;
        added += self.merge_distressed_feed(store).await;

        info!(added, known = store.borrower_count(), "discovery cycle done");
        Ok(added)
    }

    /// Scan one reserve's debt-token issuance events from its checkpoint
    /// forward. Checkpoint advances only past successfully scanned
    /// ranges, so `last_scanned_block` never moves backwards.
    async fn scan_reserve(
        &self,
        reserve: &Reserve,
        latest: u64,
        store: &mut CheckpointStore,
    ) -> usize {
        let cfg = &self.config;
        // Zero-sized tunables degrade to single-block scanning.
        let floor = cfg.chunk_floor.max(1);
        let ceiling = cfg.chunk_ceiling.max(floor);
        let existing = store.checkpoint(&reserve.underlying_asset).cloned();

        let from = match &existing {
            Some(cp) => cp.last_scanned_block + 1,
            None => latest.saturating_sub(cfg.lookback_blocks),
        };
        if from > latest {
            return 0;
        }
        let to = latest.min(from.saturating_add(cfg.max_blocks_per_run.max(1) - 1));

        let mut checkpoint =
            existing.unwrap_or_else(|| ScanCheckpoint::new(from.saturating_sub(1), floor));
        let mut chunk = checkpoint.chunk_size.clamp(floor, ceiling);
        let mut cursor = from;
        let mut attempts = 0u32;
        let mut added = 0;

        while cursor <= to {
            let chunk_end = to.min(cursor.saturating_add(chunk - 1));
            let filter = Filter::new()
                .address(reserve.debt_token)
                .event_signature(events::transfer())
                .topic1(B256::ZERO)
                .from_block(cursor)
                .to_block(chunk_end);

            match self.source.logs(&filter).await {
                Ok(logs) => {
                    let wallets = logs.iter().filter_map(issuance_recipient);
                    added += store.insert_borrowers(wallets);

                    attempts = 0;
                    checkpoint.last_scanned_block = chunk_end;
                    checkpoint.consecutive_failures = 0;
                    checkpoint.cooldown_until = None;
                    chunk = chunk.saturating_mul(2).min(ceiling);
                    checkpoint.chunk_size = chunk;
                    cursor = chunk_end + 1;
                }
                Err(err) if is_range_too_large(&err) => {
                    // Shrinking the window is not a failed attempt.
                    if chunk / 2 < floor {
                        self.abandon(reserve, &mut checkpoint, "chunk floor reached");
                        break;
                    }
                    chunk /= 2;
                    checkpoint.chunk_size = chunk;
                }
                Err(err) if is_retryable(&err) && attempts + 1 < cfg.chunk_attempts => {
                    // Same chunk again; the client rotated endpoints.
                    attempts += 1;
                    warn!(
                        symbol = %reserve.symbol,
                        attempt = attempts,
                        error = %err,
                        "transient log query failure, retrying chunk"
                    );
                    tokio::time::sleep(cfg.chunk_retry_delay() * attempts).await;
                }
                Err(err) => {
                    warn!(symbol = %reserve.symbol, error = %err, "log query failed");
                    self.abandon(reserve, &mut checkpoint, "query failure");
                    break;
                }
            }
        }

        store.set_checkpoint(reserve.underlying_asset, checkpoint);
        if added > 0 {
            debug!(symbol = %reserve.symbol, added, "borrowers from issuance scan");
        }
        added
    }

    fn abandon(&self, reserve: &Reserve, checkpoint: &mut ScanCheckpoint, reason: &str) {
        let cfg = &self.config;
        checkpoint.consecutive_failures += 1;
        let cooldown = cfg
            .cooldown_base()
            .saturating_mul(checkpoint.consecutive_failures)
            .min(cfg.cooldown_cap());
        checkpoint.cooldown_until = Utc::now().checked_add_signed(
            ChronoDuration::from_std(cooldown).unwrap_or(ChronoDuration::zero()),
        );
        warn!(
            symbol = %reserve.symbol,
            failures = checkpoint.consecutive_failures,
            cooldown_secs = cooldown.as_secs(),
            reason,
            "reserve scan abandoned"
        );
    }

    /// Wallets liquidated recently are prime re-liquidation candidates.
    /// Merged every cycle regardless of reserve cooldowns.
    async fn merge_recent_liquidations(&self, latest: u64, store: &mut CheckpointStore) -> usize {
        let from = latest.saturating_sub(self.config.liquidation_lookback);
        let filter = Filter::new()
            .address(self.pool)
            .event_signature(events::liquidation_call())
            .from_block(from)
            .to_block(latest);

        match self.source.logs(&filter).await {
            Ok(logs) => {
                let wallets = logs.iter().filter_map(liquidated_user);
                let added = store.insert_borrowers(wallets);
                if added > 0 {
                    debug!(added, "borrowers from recent liquidations");
                }
                added
            }
            Err(err) => {
                warn!(error = %err, "liquidation event query failed");
                0
            }
        }
    }

    async fn merge_distressed_feed(&self, store: &mut CheckpointStore) -> usize {
        let Some(feed) = &self.distressed else {
            return 0;
        };
        let wallets = feed.fetch_wallets(self.config.distressed_limit).await;
        store.insert_borrowers(wallets)
    }
}

/// `to` of a Transfer(from = 0x0) debt-token event.
fn issuance_recipient(log: &Log) -> Option<Address> {
    if log.topics().len() < 3 || log.topics()[1] != B256::ZERO {
        return None;
    }
    Some(Address::from_slice(&log.topics()[2][12..]))
}

/// `user` of a pool LiquidationCall event.
fn liquidated_user(log: &Log) -> Option<Address> {
    if log.topics().len() < 4 {
        return None;
    }
    Some(Address::from_slice(&log.topics()[3][12..]))
}
