//! Redis-backed cache store.
//!
//! Single shared connection manager opened at process start; the batched
//! operations go through `MULTI`/`EXEC` pipelines so their commands apply
//! atomically on the server.

use crate::store::CacheStore;
use async_trait::async_trait;
use nocturne_core::config::RedisConfig;
use nocturne_core::{NocturneError, NocturneResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and verify connectivity.
    pub async fn connect(config: &RedisConfig) -> NocturneResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str()).map_err(cache_err)?;
        let mut manager = ConnectionManager::new(client).await.map_err(cache_err)?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut manager)
            .await
            .map_err(cache_err)?;
        info!(response = %pong, "Redis connection established");

        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> NocturneResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(cache_err)
    }

    async fn scan_keys(&self, pattern: &str) -> NocturneResult<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.keys(pattern).await.map_err(cache_err)
    }

    async fn touch(&self, index: &str, score: f64, member: &str) -> NocturneResult<()> {
        let mut conn = self.manager.clone();
        conn.zadd::<_, _, _, ()>(index, member, score)
            .await
            .map_err(cache_err)
    }

    async fn index_len(&self, index: &str) -> NocturneResult<u64> {
        let mut conn = self.manager.clone();
        conn.zcard(index).await.map_err(cache_err)
    }

    async fn oldest(&self, index: &str, count: u64) -> NocturneResult<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        conn.zrange(index, 0, count as isize - 1)
            .await
            .map_err(cache_err)
    }

    async fn put_with_index(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        index: &str,
        score: f64,
    ) -> NocturneResult<()> {
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .set_ex(key, value, ttl.as_secs())
            .ignore()
            .zadd(index, key, score)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn delete_with_index(&self, keys: &[String], index: &str) -> NocturneResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .del(keys)
            .ignore()
            .zrem(index, keys)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_err)
    }
}

fn cache_err(err: redis::RedisError) -> NocturneError {
    NocturneError::Cache(err.to_string())
}
