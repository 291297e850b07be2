//! The event follower's cursor: the last event log id/time it has
//! durably applied.
//!
//! Named and shaped after the watermark concept used elsewhere in this
//! codebase for cache freshness tracking, adapted to what the original
//! cache's event loop actually persists: a `(last_event_id,
//! last_event_time)` pair computed at startup as the max of the
//! `_last_log_event_id`/`_cache_updated_at` columns across every cached
//! table, so the follower resumes exactly where the last run left off
//! without a separate journal table.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use sgcache_schema::Schema;

use crate::error::SyncResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watermark {
    pub last_event_id: Option<i64>,
}

impl Watermark {
    pub fn new(last_event_id: Option<i64>) -> Self {
        Watermark { last_event_id }
    }

    pub fn zero() -> Self {
        Watermark { last_event_id: None }
    }

    pub fn advance(&self, event_id: i64) -> Self {
        match self.last_event_id {
            Some(current) if current >= event_id => *self,
            _ => Watermark {
                last_event_id: Some(event_id),
            },
        }
    }

    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.last_event_id.unwrap_or(0) > other.last_event_id.unwrap_or(0)
    }
}

/// The scanner's own cursor: the timestamp after which a row's
/// `updated_at` must fall to be considered for re-fetch. Distinct from
/// [`Watermark`] since the scanner walks `updated_at`, not event ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    pub last_time: DateTime<Utc>,
}

impl ScanCursor {
    pub fn since(last_time: DateTime<Utc>) -> Self {
        ScanCursor { last_time }
    }
}

/// The "auto-last-id" seeding strategy named in §4.6: at startup, take
/// the maximum `_last_log_event_id` across every cached table as the
/// follower's resume point, so a restart never re-applies events it
/// already wrote through. Returns [`Watermark::zero`] if no table has
/// ever recorded an event id (a cold start with auto-seeding enabled
/// but an empty store).
pub async fn auto_last_id(schema: &Schema, pool: &Pool) -> SyncResult<Watermark> {
    let client = pool.get().await?;
    let mut max_id: Option<i64> = None;
    for entity in schema.entity_types() {
        let table = entity.table_name();
        let row = client
            .query_opt(
                &format!("SELECT MAX(_last_log_event_id) FROM {table}"),
                &[],
            )
            .await
            .map_err(sgcache_store::StoreError::from)?;
        if let Some(row) = row {
            let value: Option<i32> = row.get(0);
            if let Some(value) = value {
                max_id = Some(max_id.map_or(value as i64, |m| m.max(value as i64)));
            }
        }
    }
    Ok(Watermark::new(max_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_only_moves_forward() {
        let w = Watermark::new(Some(10));
        assert_eq!(w.advance(15).last_event_id, Some(15));
        assert_eq!(w.advance(5).last_event_id, Some(10));
    }

    #[test]
    fn zero_watermark_has_no_id() {
        assert_eq!(Watermark::zero().last_event_id, None);
    }
}
