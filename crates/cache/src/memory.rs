//! In-process cache store used by tests and the `memory` backend.
//!
//! A single mutex guards entries and index scores together, which makes
//! the batched operations trivially atomic. Expired entries are dropped on
//! read; like Redis, an index member can outlive its expired entry until a
//! sweep removes it.

use crate::store::CacheStore;
use async_trait::async_trait;
use nocturne_core::NocturneResult;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    // index name -> member -> score
    indexes: HashMap<String, HashMap<String, f64>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> NocturneResult<Option<String>> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn scan_keys(&self, pattern: &str) -> NocturneResult<Vec<String>> {
        let now = Instant::now();
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .iter()
            .filter(|(key, entry)| entry.expires_at > now && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn touch(&self, index: &str, score: f64, member: &str) -> NocturneResult<()> {
        let mut inner = self.inner.lock();
        inner
            .indexes
            .entry(index.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn index_len(&self, index: &str) -> NocturneResult<u64> {
        let inner = self.inner.lock();
        Ok(inner.indexes.get(index).map_or(0, |m| m.len() as u64))
    }

    async fn oldest(&self, index: &str, count: u64) -> NocturneResult<Vec<String>> {
        let inner = self.inner.lock();
        let Some(members) = inner.indexes.get(index) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<(&String, f64)> = members.iter().map(|(m, s)| (m, *s)).collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        Ok(scored
            .into_iter()
            .take(count as usize)
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn put_with_index(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        index: &str,
        score: f64,
    ) -> NocturneResult<()> {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        inner
            .indexes
            .entry(index.to_string())
            .or_default()
            .insert(key.to_string(), score);
        Ok(())
    }

    async fn delete_with_index(&self, keys: &[String], index: &str) -> NocturneResult<()> {
        let mut inner = self.inner.lock();
        for key in keys {
            inner.entries.remove(key);
        }
        if let Some(members) = inner.indexes.get_mut(index) {
            for key in keys {
                members.remove(key);
            }
        }
        Ok(())
    }
}

/// Glob subset the key scheme uses: a literal with at most one `*`.
fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == key,
        Some((prefix, suffix)) => {
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
    }
}
