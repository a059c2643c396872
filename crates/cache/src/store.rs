//! Cache-store abstraction: the handful of key-value and sorted-set
//! primitives the caching layer is built on, with the two cross-key
//! sequences it needs (populate-and-index, delete-and-deindex) exposed as
//! single atomic operations of the store.

use crate::client::RedisStore;
use crate::memory::MemoryStore;
use async_trait::async_trait;
use nocturne_core::config::{AppConfig, CacheBackend};
use nocturne_core::NocturneResult;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Raw serialized entry under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> NocturneResult<Option<String>>;

    /// Live keys matching a glob pattern.
    async fn scan_keys(&self, pattern: &str) -> NocturneResult<Vec<String>>;

    /// Upsert `member` into the sorted set `index` at `score`.
    async fn touch(&self, index: &str, score: f64, member: &str) -> NocturneResult<()>;

    /// Cardinality of the sorted set `index`.
    async fn index_len(&self, index: &str) -> NocturneResult<u64>;

    /// Up to `count` lowest-scored members of `index`, lowest first.
    async fn oldest(&self, index: &str, count: u64) -> NocturneResult<Vec<String>>;

    /// Store `value` under `key` with `ttl` and index the key at `score`,
    /// as one atomic batch: no observer sees the entry without its index
    /// member or vice versa.
    async fn put_with_index(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        index: &str,
        score: f64,
    ) -> NocturneResult<()>;

    /// Delete entries and their index members as one atomic batch.
    async fn delete_with_index(&self, keys: &[String], index: &str) -> NocturneResult<()>;
}

/// Open the cache backend selected by configuration. This is the only
/// place the backend choice is branched on.
pub async fn connect(config: &AppConfig) -> NocturneResult<Arc<dyn CacheStore>> {
    match config.cache.backend {
        CacheBackend::Redis => Ok(Arc::new(RedisStore::connect(&config.redis).await?)),
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
