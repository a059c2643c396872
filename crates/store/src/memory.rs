//! In-memory durable sleep-record repository.
//!
//! The authoritative store the cache decorator wraps in tests and in
//! deployments running without a relational database. Query semantics
//! match the relational implementation: listings are newest-first,
//! pagination counts the full filtered set, the completed-since window
//! keeps only finished sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nocturne_core::{
    NewSleepRecord, NocturneError, NocturneResult, SleepRecord, SleepRecordRepository, SortOrder,
};
use uuid::Uuid;

#[derive(Default)]
pub struct MemorySleepRecordRepository {
    records: DashMap<Uuid, SleepRecord>,
}

impl MemorySleepRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn completed_in_window(&self, user_ids: &[Uuid], since: DateTime<Utc>) -> Vec<SleepRecord> {
        self.records
            .iter()
            .filter(|entry| {
                let rec = entry.value();
                user_ids.contains(&rec.user_id) && rec.is_completed() && rec.start_time >= since
            })
            .map(|entry| entry.value().clone())
            .collect()
    }
}

// created_at ties broken by id so page boundaries are stable.
fn newest_first(records: &mut [SleepRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn by_duration(records: &mut [SleepRecord], sort: SortOrder) {
    records.sort_by(|a, b| {
        let ordering = a
            .duration_in_seconds()
            .cmp(&b.duration_in_seconds())
            .then_with(|| a.id.cmp(&b.id));
        match sort {
            SortOrder::DurationAsc => ordering,
            SortOrder::DurationDesc => ordering.reverse(),
        }
    });
}

fn page_of(records: Vec<SleepRecord>, page: u32, per_page: u32) -> (Vec<SleepRecord>, u64) {
    let total = records.len() as u64;
    let offset = page.saturating_sub(1) as usize * per_page as usize;
    let paged = records
        .into_iter()
        .skip(offset)
        .take(per_page as usize)
        .collect();
    (paged, total)
}

#[async_trait]
impl SleepRecordRepository for MemorySleepRecordRepository {
    async fn find(&self, id: Uuid) -> NocturneResult<Option<SleepRecord>> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, new: NewSleepRecord) -> NocturneResult<SleepRecord> {
        let now = Utc::now();
        let record = SleepRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            start_time: new.start_time,
            end_time: new.end_time,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: &SleepRecord) -> NocturneResult<SleepRecord> {
        let mut entry = self
            .records
            .get_mut(&record.id)
            .ok_or(NocturneError::RecordNotFound(record.id))?;
        entry.start_time = record.start_time;
        entry.end_time = record.end_time;
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    async fn find_all_by_user(&self, user_id: Uuid) -> NocturneResult<Vec<SleepRecord>> {
        let mut records: Vec<SleepRecord> = self
            .records
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn find_all_by_user_paginated(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> NocturneResult<(Vec<SleepRecord>, u64)> {
        let records = self.find_all_by_user(user_id).await?;
        Ok(page_of(records, page, per_page))
    }

    async fn find_completed_since(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> NocturneResult<Vec<SleepRecord>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut records = self.completed_in_window(user_ids, since);
        // Deterministic order for a window query: oldest start first.
        records.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn find_completed_since_paginated(
        &self,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
        page: u32,
        per_page: u32,
        sort: SortOrder,
    ) -> NocturneResult<(Vec<SleepRecord>, u64)> {
        if user_ids.is_empty() {
            return Ok((Vec::new(), 0));
        }
        let mut records = self.completed_in_window(user_ids, since);
        by_duration(&mut records, sort);
        Ok(page_of(records, page, per_page))
    }
}
