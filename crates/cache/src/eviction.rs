//! Approximate-LRU eviction over the shared key index.
//!
//! Every live cache entry has a member in one global sorted set, scored by
//! last-touch time. Once the index reaches the configured ceiling, the
//! oldest fraction of members is dropped together with their entries. The
//! policy is approximate: the index spans all key families, and concurrent
//! sweeps may both fire (idempotent over-eviction is tolerated).

use crate::store::CacheStore;
use chrono::Utc;
use nocturne_core::config::CacheConfig;
use nocturne_core::NocturneResult;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// Name of the sorted set holding every live cache key.
pub const LRU_INDEX_KEY: &str = "lru:keys";

#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    /// Entry-count ceiling that triggers a sweep.
    pub max_entries: u64,
    /// Fraction of the ceiling removed per sweep.
    pub evict_fraction: f64,
}

impl EvictionPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            evict_fraction: config.evict_fraction,
        }
    }

    /// Number of members removed per sweep.
    pub fn sweep_size(&self) -> u64 {
        (self.max_entries as f64 * self.evict_fraction).floor() as u64
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Evict the least-recently-touched entries if the index is at capacity.
/// Returns the number of entries removed; a sweep that finds nothing to
/// remove (a concurrent sweep won the race) is a no-op.
pub async fn evict_if_full(
    store: &dyn CacheStore,
    policy: &EvictionPolicy,
) -> NocturneResult<usize> {
    let len = store.index_len(LRU_INDEX_KEY).await?;
    if len < policy.max_entries {
        return Ok(0);
    }

    let victims = store.oldest(LRU_INDEX_KEY, policy.sweep_size()).await?;
    if victims.is_empty() {
        return Ok(0);
    }

    store.delete_with_index(&victims, LRU_INDEX_KEY).await?;
    metrics::counter!("cache.evicted").increment(victims.len() as u64);
    debug!(evicted = victims.len(), index_len = len, "LRU sweep complete");
    Ok(victims.len())
}

/// Last-touch score: wall-clock microseconds, pushed through a high-water
/// mark so scores taken in the same microsecond stay strictly increasing.
pub fn now_score() -> f64 {
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next as f64,
            Err(actual) => prev = actual,
        }
    }
}
