use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single sleep session. `end_time` stays `None` while the session is in
/// progress; a record is *completed* once it is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SleepRecord {
    /// Elapsed sleep time, `None` while the session is still open.
    pub fn duration_in_seconds(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds())
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Creation payload. The durable store assigns `id`, `created_at` and
/// `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSleepRecord {
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Ordering for the paged completed-records query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    DurationDesc,
    DurationAsc,
}

impl fmt::Display for SortOrder {
    /// Stable token used in cache keys and configuration.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::DurationDesc => f.write_str("duration_desc"),
            SortOrder::DurationAsc => f.write_str("duration_asc"),
        }
    }
}
