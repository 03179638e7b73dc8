//! TTL cache for wholesale snapshots.
//!
//! Remote feeds are fetched wholesale and reused for a configured
//! lifetime. A refresh failure serves the last good snapshot instead of
//! taking the pipeline down; only a cold cache propagates the error.

use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// Single-slot cache holding one snapshot with a fixed TTL.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached snapshot if still fresh, otherwise run `fetch`.
    /// When the refresh fails and a stale snapshot exists, serve it and
    /// log the failure.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }

        match fetch().await {
            Ok(value) => {
                *slot = Some(Entry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(value)
            }
            Err(err) => match slot.as_ref() {
                Some(stale) => {
                    warn!(error = %err, "refresh failed, serving stale snapshot");
                    Ok(stale.value.clone())
                }
                None => Err(err),
            },
        }
    }
}
