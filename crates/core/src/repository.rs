//! The durable sleep-record store contract. One method per query shape the
//! caching layer knows how to cache; the cached decorator exposes this
//! exact surface.

use crate::error::NocturneResult;
use crate::types::{NewSleepRecord, SleepRecord, SortOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait SleepRecordRepository: Send + Sync {
    /// Point lookup by record id.
    async fn find(&self, id: Uuid) -> NocturneResult<Option<SleepRecord>>;

    /// Persist a new record, assigning identity and timestamps.
    async fn create(&self, new: NewSleepRecord) -> NocturneResult<SleepRecord>;

    /// Replace the record's session times, bumping `updated_at`.
    /// Fails with `RecordNotFound` when the id is unknown.
    async fn update(&self, record: &SleepRecord) -> NocturneResult<SleepRecord>;

    /// All records for one user, most recently created first.
    async fn find_all_by_user(&self, user_id: Uuid) -> NocturneResult<Vec<SleepRecord>>;

    /// One page of a user's records (1-based `page`) plus the total count
    /// of matching rows.
    async fn find_all_by_user_paginated(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> NocturneResult<(Vec<SleepRecord>, u64)>;

    /// Completed records started at or after `since` for any of `user_ids`.
    /// An empty id list yields an empty result.
    async fn find_completed_since(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> NocturneResult<Vec<SleepRecord>>;

    /// Paged variant of [`find_completed_since`], ordered by sleep duration.
    ///
    /// [`find_completed_since`]: SleepRecordRepository::find_completed_since
    async fn find_completed_since_paginated(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
        page: u32,
        per_page: u32,
        sort: SortOrder,
    ) -> NocturneResult<(Vec<SleepRecord>, u64)>;
}
