//! Persistent pipeline state.
//!
//! Scan checkpoints, the known-borrower set and the screening cursor
//! live in one human-inspectable JSON file so restarts resume instead
//! of re-scanning history. Writes go through a temp file and rename so
//! a crash mid-write never corrupts the previous snapshot.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info};

/// Per-reserve log scan progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub last_scanned_block: u64,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub chunk_size: u64,
}

impl ScanCheckpoint {
    pub fn new(last_scanned_block: u64, chunk_size: u64) -> Self {
        Self {
            last_scanned_block,
            consecutive_failures: 0,
            cooldown_until: None,
            chunk_size,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    checkpoints: HashMap<Address, ScanCheckpoint>,
    /// Insertion ordered, oldest first.
    #[serde(default)]
    borrowers: VecDeque<Address>,
    #[serde(default)]
    screen_cursor: usize,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// On-disk pipeline state with a capped known-borrower set.
pub struct CheckpointStore {
    path: PathBuf,
    state: StoreState,
    seen: HashSet<Address>,
    cap: usize,
}

impl CheckpointStore {
    /// Load from `path`, starting empty when the file does not exist.
    pub fn load(path: impl Into<PathBuf>, cap: usize) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parsing state file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading state file {}", path.display()))
            }
        };

        let mut store = Self {
            path,
            seen: state.borrowers.iter().copied().collect(),
            state,
            cap,
        };
        store.enforce_cap();
        info!(
            borrowers = store.state.borrowers.len(),
            checkpoints = store.state.checkpoints.len(),
            "state loaded"
        );
        Ok(store)
    }

    /// Write the current state atomically.
    pub fn save(&mut self) -> Result<()> {
        self.state.updated_at = Some(Utc::now());
        let raw = serde_json::to_string_pretty(&self.state)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .with_context(|| format!("writing state file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing state file {}", self.path.display()))?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    pub fn checkpoint(&self, asset: &Address) -> Option<&ScanCheckpoint> {
        self.state.checkpoints.get(asset)
    }

    pub fn set_checkpoint(&mut self, asset: Address, checkpoint: ScanCheckpoint) {
        self.state.checkpoints.insert(asset, checkpoint);
    }

    /// Add borrowers, newest last, deduplicating and evicting the oldest
    /// beyond capacity. Returns how many were new.
    pub fn insert_borrowers(&mut self, wallets: impl IntoIterator<Item = Address>) -> usize {
        let mut added = 0;
        for wallet in wallets {
            if wallet == Address::ZERO || !self.seen.insert(wallet) {
                continue;
            }
            self.state.borrowers.push_back(wallet);
            added += 1;
        }
        self.enforce_cap();
        added
    }

    fn enforce_cap(&mut self) {
        while self.state.borrowers.len() > self.cap {
            if let Some(evicted) = self.state.borrowers.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        if self.state.screen_cursor > self.state.borrowers.len() {
            self.state.screen_cursor = 0;
        }
    }

    pub fn borrower_count(&self) -> usize {
        self.state.borrowers.len()
    }

    /// Next window of wallets to screen, advancing the persisted cursor
    /// so the whole set is eventually covered across cycles.
    pub fn screening_window(&mut self, budget: usize) -> Vec<Address> {
        let total = self.state.borrowers.len();
        if total == 0 || budget == 0 {
            return Vec::new();
        }

        let start = self.state.screen_cursor % total;
        let take = budget.min(total);
        let window: Vec<Address> = self
            .state
            .borrowers
            .iter()
            .cycle()
            .skip(start)
            .take(take)
            .copied()
            .collect();
        self.state.screen_cursor = (start + take) % total;
        window
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn temp_store(cap: usize) -> CheckpointStore {
        let path = std::env::temp_dir().join(format!(
            "flashliq-store-test-{}-{}.json",
            std::process::id(),
            rand_suffix()
        ));
        let _ = std::fs::remove_file(&path);
        CheckpointStore::load(path, cap).unwrap()
    }

    fn rand_suffix() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    #[test]
    fn insert_dedupes_and_evicts_oldest() {
        let mut store = temp_store(3);
        assert_eq!(store.insert_borrowers([addr(1), addr(2), addr(1)]), 2);
        assert_eq!(store.insert_borrowers([addr(3), addr(4)]), 2);
        assert_eq!(store.borrower_count(), 3);
        // addr(1) was evicted, so it may be re-added
        assert_eq!(store.insert_borrowers([addr(1)]), 1);
    }

    #[test]
    fn zero_address_is_never_tracked() {
        let mut store = temp_store(10);
        assert_eq!(store.insert_borrowers([Address::ZERO, addr(1)]), 1);
    }

    #[test]
    fn screening_window_rotates_across_whole_set() {
        let mut store = temp_store(10);
        store.insert_borrowers([addr(1), addr(2), addr(3), addr(4), addr(5)]);

        let first = store.screening_window(2);
        let second = store.screening_window(2);
        let third = store.screening_window(2);
        assert_eq!(first, vec![addr(1), addr(2)]);
        assert_eq!(second, vec![addr(3), addr(4)]);
        assert_eq!(third, vec![addr(5), addr(1)]);
    }

    #[test]
    fn window_budget_larger_than_set_takes_each_once() {
        let mut store = temp_store(10);
        store.insert_borrowers([addr(1), addr(2)]);
        assert_eq!(store.screening_window(50), vec![addr(1), addr(2)]);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let mut store = temp_store(10);
        store.insert_borrowers([addr(1), addr(2)]);
        store.set_checkpoint(addr(9), ScanCheckpoint::new(1_000, 500));
        store.screening_window(1);
        store.save().unwrap();

        let path = store.path().to_path_buf();
        let mut reloaded = CheckpointStore::load(&path, 10).unwrap();
        assert_eq!(reloaded.borrower_count(), 2);
        assert_eq!(
            reloaded.checkpoint(&addr(9)).unwrap().last_scanned_block,
            1_000
        );
        // cursor persisted: next window starts where we left off
        assert_eq!(reloaded.screening_window(1), vec![addr(2)]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn cooldown_check_respects_clock() {
        let mut cp = ScanCheckpoint::new(0, 500);
        let now = Utc::now();
        assert!(!cp.in_cooldown(now));
        cp.cooldown_until = Some(now + chrono::Duration::seconds(60));
        assert!(cp.in_cooldown(now));
        assert!(!cp.in_cooldown(now + chrono::Duration::seconds(120)));
    }
}
