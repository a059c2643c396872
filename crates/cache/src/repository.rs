//! Cache-aside decorator over a durable sleep-record repository.
//!
//! Reads go through the cache: a hit deserializes the stored JSON and
//! bumps the key's last-touch score; a miss loads from the durable store,
//! populates the cache entry and its index member in one atomic batch,
//! then runs an eviction sweep if the cache is at capacity. Writes
//! delegate first, then drop every cached view scoped to the record's
//! owner (plus the record's own point-lookup entry on update). The
//! completed-since aggregate families are left to expire by TTL; their
//! key space is combinatorial, so write-time invalidation is not
//! attempted for them.

use crate::eviction::{self, now_score, EvictionPolicy, LRU_INDEX_KEY};
use crate::keys;
use crate::store::CacheStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nocturne_core::config::CacheConfig;
use nocturne_core::{NewSleepRecord, NocturneResult, SleepRecord, SleepRecordRepository, SortOrder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Envelope for paginated results stored in the cache.
#[derive(Debug, Serialize, Deserialize)]
struct CachedPage {
    records: Vec<SleepRecord>,
    total_count: u64,
}

pub struct CachedSleepRecordRepository<R> {
    inner: R,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    policy: EvictionPolicy,
}

impl<R: SleepRecordRepository> CachedSleepRecordRepository<R> {
    pub fn new(inner: R, store: Arc<dyn CacheStore>, ttl: Duration, policy: EvictionPolicy) -> Self {
        Self {
            inner,
            store,
            ttl,
            policy,
        }
    }

    pub fn from_config(inner: R, store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self::new(
            inner,
            store,
            Duration::from_secs(config.ttl_secs),
            EvictionPolicy::from_config(config),
        )
    }

    /// Read-through core shared by every query method. `load` is only
    /// awaited on a miss; its result is returned as-is, never the
    /// round-tripped deserialized form. `cache_if` decides whether the
    /// loaded value is worth an entry (empty results are not).
    async fn fetch<T>(
        &self,
        key: &str,
        load: impl Future<Output = NocturneResult<T>> + Send,
        cache_if: impl FnOnce(&T) -> bool + Send,
    ) -> NocturneResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if let Some(raw) = self.store.get(key).await? {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    metrics::counter!("cache.hit").increment(1);
                    // The index only affects eviction choice; a failed
                    // score bump must not fail a successful read.
                    if let Err(err) = self.store.touch(LRU_INDEX_KEY, now_score(), key).await {
                        warn!(key = %key, error = %err, "Failed to bump LRU score");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Corrupt cache entry, reloading from store");
                }
            }
        }

        metrics::counter!("cache.miss").increment(1);
        debug!(key = %key, "Cache miss");

        let value = load.await?;
        if cache_if(&value) {
            let json = serde_json::to_string(&value)?;
            self.store
                .put_with_index(key, &json, self.ttl, LRU_INDEX_KEY, now_score())
                .await?;
            eviction::evict_if_full(self.store.as_ref(), &self.policy).await?;
        }
        Ok(value)
    }

    /// Drop every cached view scoped to `user_id`, plus `record_id`'s
    /// point-lookup entry when given, in one atomic batch.
    async fn invalidate_user(&self, user_id: Uuid, record_id: Option<Uuid>) -> NocturneResult<()> {
        let mut stale = self.store.scan_keys(&keys::user_pattern(user_id)).await?;
        if let Some(id) = record_id {
            stale.push(keys::sleep_record(id));
        }
        if stale.is_empty() {
            return Ok(());
        }

        debug!(user_id = %user_id, keys = stale.len(), "Invalidating cached views");
        self.store.delete_with_index(&stale, LRU_INDEX_KEY).await?;
        metrics::counter!("cache.invalidated").increment(stale.len() as u64);
        Ok(())
    }
}

#[async_trait]
impl<R: SleepRecordRepository> SleepRecordRepository for CachedSleepRecordRepository<R> {
    async fn find(&self, id: Uuid) -> NocturneResult<Option<SleepRecord>> {
        self.fetch(&keys::sleep_record(id), self.inner.find(id), Option::is_some)
            .await
    }

    async fn create(&self, new: NewSleepRecord) -> NocturneResult<SleepRecord> {
        let created = self.inner.create(new).await?;
        self.invalidate_user(created.user_id, None).await?;
        Ok(created)
    }

    async fn update(&self, record: &SleepRecord) -> NocturneResult<SleepRecord> {
        let updated = self.inner.update(record).await?;
        self.invalidate_user(updated.user_id, Some(updated.id)).await?;
        Ok(updated)
    }

    async fn find_all_by_user(&self, user_id: Uuid) -> NocturneResult<Vec<SleepRecord>> {
        self.fetch(
            &keys::user_records(user_id),
            self.inner.find_all_by_user(user_id),
            |records| !records.is_empty(),
        )
        .await
    }

    async fn find_all_by_user_paginated(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> NocturneResult<(Vec<SleepRecord>, u64)> {
        let key = keys::user_records_page(user_id, page, per_page);
        let cached = self
            .fetch(
                &key,
                async {
                    let (records, total_count) = self
                        .inner
                        .find_all_by_user_paginated(user_id, page, per_page)
                        .await?;
                    Ok(CachedPage {
                        records,
                        total_count,
                    })
                },
                |page| !page.records.is_empty(),
            )
            .await?;
        Ok((cached.records, cached.total_count))
    }

    async fn find_completed_since(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> NocturneResult<Vec<SleepRecord>> {
        self.fetch(
            &keys::completed_since(user_ids, since),
            self.inner.find_completed_since(user_ids, since),
            |records| !records.is_empty(),
        )
        .await
    }

    async fn find_completed_since_paginated(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
        page: u32,
        per_page: u32,
        sort: SortOrder,
    ) -> NocturneResult<(Vec<SleepRecord>, u64)> {
        let key = keys::completed_since_paginated(user_ids, since, page, per_page, sort);
        let cached = self
            .fetch(
                &key,
                async {
                    let (records, total_count) = self
                        .inner
                        .find_completed_since_paginated(user_ids, since, page, per_page, sort)
                        .await?;
                    Ok(CachedPage {
                        records,
                        total_count,
                    })
                },
                |page| !page.records.is_empty(),
            )
            .await?;
        Ok((cached.records, cached.total_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use nocturne_store::MemorySleepRecordRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Durable-store wrapper that counts loader invocations per query
    /// shape, so tests can tell a hit from a miss.
    #[derive(Clone, Default)]
    struct CountingRepository {
        inner: Arc<MemorySleepRecordRepository>,
        finds: Arc<AtomicUsize>,
        user_lists: Arc<AtomicUsize>,
        user_pages: Arc<AtomicUsize>,
        since_lists: Arc<AtomicUsize>,
        since_pages: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SleepRecordRepository for CountingRepository {
        async fn find(&self, id: Uuid) -> NocturneResult<Option<SleepRecord>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find(id).await
        }

        async fn create(&self, new: NewSleepRecord) -> NocturneResult<SleepRecord> {
            self.inner.create(new).await
        }

        async fn update(&self, record: &SleepRecord) -> NocturneResult<SleepRecord> {
            self.inner.update(record).await
        }

        async fn find_all_by_user(&self, user_id: Uuid) -> NocturneResult<Vec<SleepRecord>> {
            self.user_lists.fetch_add(1, Ordering::SeqCst);
            self.inner.find_all_by_user(user_id).await
        }

        async fn find_all_by_user_paginated(
            &self,
            user_id: Uuid,
            page: u32,
            per_page: u32,
        ) -> NocturneResult<(Vec<SleepRecord>, u64)> {
            self.user_pages.fetch_add(1, Ordering::SeqCst);
            self.inner
                .find_all_by_user_paginated(user_id, page, per_page)
                .await
        }

        async fn find_completed_since(
            &self,
            user_ids: &[Uuid],
            since: DateTime<Utc>,
        ) -> NocturneResult<Vec<SleepRecord>> {
            self.since_lists.fetch_add(1, Ordering::SeqCst);
            self.inner.find_completed_since(user_ids, since).await
        }

        async fn find_completed_since_paginated(
            &self,
            user_ids: &[Uuid],
            since: DateTime<Utc>,
            page: u32,
            per_page: u32,
            sort: SortOrder,
        ) -> NocturneResult<(Vec<SleepRecord>, u64)> {
            self.since_pages.fetch_add(1, Ordering::SeqCst);
            self.inner
                .find_completed_since_paginated(user_ids, since, page, per_page, sort)
                .await
        }
    }

    struct TestContext {
        cached: CachedSleepRecordRepository<CountingRepository>,
        counting: CountingRepository,
        store: Arc<MemoryStore>,
    }

    fn context_with(ttl: Duration, policy: EvictionPolicy) -> TestContext {
        let counting = CountingRepository::default();
        let store = Arc::new(MemoryStore::new());
        let cached =
            CachedSleepRecordRepository::new(counting.clone(), store.clone(), ttl, policy);
        TestContext {
            cached,
            counting,
            store,
        }
    }

    fn context() -> TestContext {
        context_with(Duration::from_secs(300), EvictionPolicy::default())
    }

    fn new_record(user_id: Uuid, completed: bool) -> NewSleepRecord {
        let start = Utc::now() - ChronoDuration::hours(8);
        NewSleepRecord {
            user_id,
            start_time: start,
            end_time: completed.then(|| start + ChronoDuration::hours(8)),
        }
    }

    #[tokio::test]
    async fn test_read_through_matches_durable_result_then_hits() {
        let ctx = context();
        let user = Uuid::new_v4();
        ctx.cached.create(new_record(user, true)).await.unwrap();

        let first = ctx.cached.find_all_by_user(user).await.unwrap();
        let direct = ctx.counting.inner.find_all_by_user(user).await.unwrap();
        assert_eq!(first, direct);
        assert_eq!(ctx.counting.user_lists.load(Ordering::SeqCst), 1);

        let second = ctx.cached.find_all_by_user(user).await.unwrap();
        assert_eq!(second, first);
        // Served from cache: the durable store was not consulted again.
        assert_eq!(ctx.counting.user_lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_point_lookup_hits_after_populate() {
        let ctx = context();
        let rec = ctx
            .cached
            .create(new_record(Uuid::new_v4(), false))
            .await
            .unwrap();

        let first = ctx.cached.find(rec.id).await.unwrap();
        let second = ctx.cached.find(rec.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(rec));
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_invalidates_owner_listings() {
        let ctx = context();
        let user = Uuid::new_v4();
        ctx.cached.create(new_record(user, true)).await.unwrap();

        let warm = ctx.cached.find_all_by_user(user).await.unwrap();
        assert_eq!(warm.len(), 1);
        assert_eq!(ctx.counting.user_lists.load(Ordering::SeqCst), 1);

        ctx.cached.create(new_record(user, true)).await.unwrap();

        let reloaded = ctx.cached.find_all_by_user(user).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(ctx.counting.user_lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_update_invalidates_point_lookup() {
        let ctx = context();
        let rec = ctx
            .cached
            .create(new_record(Uuid::new_v4(), false))
            .await
            .unwrap();

        assert!(ctx.cached.find(rec.id).await.unwrap().unwrap().end_time.is_none());

        let mut completed = rec.clone();
        completed.end_time = Some(completed.start_time + ChronoDuration::hours(7));
        ctx.cached.update(&completed).await.unwrap();

        let reloaded = ctx.cached.find(rec.id).await.unwrap().unwrap();
        assert!(reloaded.end_time.is_some());
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_paged_owner_query_invalidated_by_update() {
        let ctx = context();
        let user = Uuid::new_v4();
        let rec = ctx.cached.create(new_record(user, true)).await.unwrap();

        let (page, total) = ctx
            .cached
            .find_all_by_user_paginated(user, 1, 20)
            .await
            .unwrap();
        assert_eq!((page.len(), total), (1, 1));

        // Second identical query is a hit.
        ctx.cached
            .find_all_by_user_paginated(user, 1, 20)
            .await
            .unwrap();
        assert_eq!(ctx.counting.user_pages.load(Ordering::SeqCst), 1);

        let mut changed = rec.clone();
        changed.end_time = Some(changed.start_time + ChronoDuration::hours(9));
        ctx.cached.update(&changed).await.unwrap();

        let (reloaded, _) = ctx
            .cached
            .find_all_by_user_paginated(user, 1, 20)
            .await
            .unwrap();
        assert_eq!(ctx.counting.user_pages.load(Ordering::SeqCst), 2);
        assert_eq!(reloaded[0].end_time, changed.end_time);
    }

    #[tokio::test]
    async fn test_aggregate_queries_left_to_ttl_on_write() {
        let ctx = context();
        let user = Uuid::new_v4();
        let rec = ctx.cached.create(new_record(user, true)).await.unwrap();
        let since = Utc::now() - ChronoDuration::days(1);

        let warm = ctx
            .cached
            .find_completed_since(&[user], since)
            .await
            .unwrap();
        assert_eq!(warm.len(), 1);

        let mut changed = rec;
        changed.end_time = Some(changed.start_time + ChronoDuration::hours(6));
        ctx.cached.update(&changed).await.unwrap();

        // The aggregate family is not write-invalidated: still a hit,
        // still the pre-update view, until TTL expiry.
        let stale = ctx
            .cached
            .find_completed_since(&[user], since)
            .await
            .unwrap();
        assert_eq!(stale, warm);
        assert_eq!(ctx.counting.since_lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let ctx = context();

        let missing = Uuid::new_v4();
        assert_eq!(ctx.cached.find(missing).await.unwrap(), None);
        assert_eq!(ctx.cached.find(missing).await.unwrap(), None);
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 2);

        let lonely = Uuid::new_v4();
        assert!(ctx.cached.find_all_by_user(lonely).await.unwrap().is_empty());
        assert!(ctx.cached.find_all_by_user(lonely).await.unwrap().is_empty());
        assert_eq!(ctx.counting.user_lists.load(Ordering::SeqCst), 2);
        assert!(ctx.store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reloaded_and_overwritten() {
        let ctx = context();
        let rec = ctx
            .cached
            .create(new_record(Uuid::new_v4(), true))
            .await
            .unwrap();

        ctx.store
            .put_with_index(
                &keys::sleep_record(rec.id),
                "{not valid json",
                Duration::from_secs(300),
                LRU_INDEX_KEY,
                now_score(),
            )
            .await
            .unwrap();

        let found = ctx.cached.find(rec.id).await.unwrap();
        assert_eq!(found, Some(rec.clone()));
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 1);

        // The bad entry was overwritten by the reload.
        ctx.cached.find(rec.id).await.unwrap();
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let ctx = context_with(Duration::from_millis(40), EvictionPolicy::default());
        let rec = ctx
            .cached
            .create(new_record(Uuid::new_v4(), true))
            .await
            .unwrap();

        ctx.cached.find(rec.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        ctx.cached.find(rec.id).await.unwrap();
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recently_used_first() {
        let policy = EvictionPolicy {
            max_entries: 4,
            evict_fraction: 0.25,
        };
        let ctx = context_with(Duration::from_secs(300), policy);

        let mut records = Vec::new();
        for _ in 0..3 {
            let rec = ctx
                .cached
                .create(new_record(Uuid::new_v4(), true))
                .await
                .unwrap();
            ctx.cached.find(rec.id).await.unwrap();
            records.push(rec);
        }
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 3);

        // Re-access the first record so the second becomes the oldest.
        ctx.cached.find(records[0].id).await.unwrap();
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 3);

        // Fourth populate reaches the ceiling and sweeps one key.
        let fourth = ctx
            .cached
            .create(new_record(Uuid::new_v4(), true))
            .await
            .unwrap();
        ctx.cached.find(fourth.id).await.unwrap();

        // records[1] was evicted, records[0] survived its re-access.
        ctx.cached.find(records[1].id).await.unwrap();
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 5);
        ctx.cached.find(records[0].id).await.unwrap();
        assert_eq!(ctx.counting.finds.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_completed_since_paginated_round_trip() {
        let ctx = context();
        let user = Uuid::new_v4();
        for _ in 0..3 {
            ctx.cached.create(new_record(user, true)).await.unwrap();
        }
        let since = Utc::now() - ChronoDuration::days(1);

        let (first, total) = ctx
            .cached
            .find_completed_since_paginated(&[user], since, 1, 2, SortOrder::DurationDesc)
            .await
            .unwrap();
        assert_eq!((first.len(), total), (2, 3));

        let (second, second_total) = ctx
            .cached
            .find_completed_since_paginated(&[user], since, 1, 2, SortOrder::DurationDesc)
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(second_total, total);
        assert_eq!(ctx.counting.since_pages.load(Ordering::SeqCst), 1);
    }
}
