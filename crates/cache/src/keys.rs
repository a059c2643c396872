//! Cache-key construction, one family per query shape.
//!
//! Two logically identical queries must always produce byte-identical keys
//! (list inputs are sorted before joining) and two different queries must
//! never collide, so every parameter that affects a result set appears in
//! its key. Keys for data belonging to a single user share the
//! `user:<id>:` prefix, which is the unit of write invalidation.

use chrono::{DateTime, Utc};
use nocturne_core::types::SortOrder;
use uuid::Uuid;

/// Point lookup by record id.
pub fn sleep_record(id: Uuid) -> String {
    format!("sleep_record:{id}")
}

/// Unpaged listing of one user's records.
pub fn user_records(user_id: Uuid) -> String {
    format!("user:{user_id}:sleep_records")
}

/// One page of a user's records.
pub fn user_records_page(user_id: Uuid, page: u32, per_page: u32) -> String {
    format!("user:{user_id}:sleep_records:page:{page}:per_page:{per_page}")
}

/// Glob matching every cached view scoped to `user_id`.
pub fn user_pattern(user_id: Uuid) -> String {
    format!("user:{user_id}:*")
}

/// Unpaged completed-records window across a set of users.
pub fn completed_since(user_ids: &[Uuid], since: DateTime<Utc>) -> String {
    format!("completed_since:{}:{}", joined_ids(user_ids), since.to_rfc3339())
}

/// Paged completed-records window across a set of users.
pub fn completed_since_paginated(
    user_ids: &[Uuid],
    since: DateTime<Utc>,
    page: u32,
    per_page: u32,
    sort: SortOrder,
) -> String {
    format!(
        "completed_since_paginated:{}:{}:{page}:{per_page}:{sort}",
        joined_ids(user_ids),
        since.to_rfc3339()
    )
}

fn joined_ids(user_ids: &[Uuid]) -> String {
    let mut ids: Vec<String> = user_ids.iter().map(Uuid::to_string).collect();
    ids.sort_unstable();
    ids.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_list_order_does_not_change_key() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let since = Utc::now();
        assert_eq!(
            completed_since(&[a, b], since),
            completed_since(&[b, a], since)
        );
    }

    #[test]
    fn test_every_parameter_appears_in_paged_keys() {
        let user = Uuid::new_v4();
        let base = user_records_page(user, 1, 20);
        assert_ne!(base, user_records_page(user, 2, 20));
        assert_ne!(base, user_records_page(user, 1, 10));
        assert_ne!(base, user_records(user));
    }

    #[test]
    fn test_sort_order_distinguishes_aggregate_keys() {
        let ids = [Uuid::new_v4()];
        let since = Utc::now();
        assert_ne!(
            completed_since_paginated(&ids, since, 1, 20, SortOrder::DurationDesc),
            completed_since_paginated(&ids, since, 1, 20, SortOrder::DurationAsc)
        );
    }

    #[test]
    fn test_owner_pattern_covers_owner_keys_only() {
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let pattern = user_pattern(user);
        let prefix = pattern.trim_end_matches('*');

        assert!(user_records(user).starts_with(prefix));
        assert!(user_records_page(user, 3, 50).starts_with(prefix));
        assert!(!user_records(other).starts_with(prefix));
        assert!(!sleep_record(Uuid::new_v4()).starts_with(prefix));
    }
}
