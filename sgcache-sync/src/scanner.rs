//! The periodic scanner: a reconciliation backstop for anything the
//! event follower missed (deleted events, missed windows, cold start).
//!
//! Grounded on the original implementation's `Scanner.scan`/`_scan`/
//! `_find_active_and_retired`: each tick walks every cached entity type
//! in name-sorted order (for deterministic logs), queries the upstream
//! twice per type — once for active rows, once for retired ones — using
//! an `updated_at > watermark` filter optionally narrowed by project
//! id, writes every returned row through with `create_with_id = true`,
//! and only then advances the watermark to `scan_start - 1s` to absorb
//! clock skew.

use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::Pool;
use serde_json::Value as JsonValue;
use sgcache_schema::Schema;
use sgcache_store::write::{self, UpsertRequest};
use sgcache_store::UpsertOrigin;
use tracing::{error, info};

use crate::error::SyncResult;
use crate::upstream::{SearchRequest, UpstreamClient};
use crate::watermark::ScanCursor;

/// Narrows a scan to a subset of entity types and/or projects. Empty
/// vectors mean "no narrowing", matching the original's `types`/
/// `projects` constructor arguments defaulting to `None`.
#[derive(Debug, Clone, Default)]
pub struct ScanScope {
    pub types: Vec<String>,
    pub project_ids: Vec<i64>,
}

impl ScanScope {
    fn includes(&self, entity_type: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == entity_type)
    }
}

pub struct Scanner {
    schema: Arc<Schema>,
    pool: Pool,
    upstream: Arc<dyn UpstreamClient>,
    scope: ScanScope,
}

impl Scanner {
    pub fn new(schema: Arc<Schema>, pool: Pool, upstream: Arc<dyn UpstreamClient>, scope: ScanScope) -> Self {
        Scanner {
            schema,
            pool,
            upstream,
            scope,
        }
    }

    /// Runs the periodic-tick loop until `should_continue` returns
    /// false between ticks, sleeping `tick_interval` between scans
    /// (capped the way the original caps its sleep at 60s per
    /// iteration so a `poll` wakeup is never more than a minute late).
    pub async fn run(
        &self,
        mut cursor: Option<ScanCursor>,
        tick_interval: Duration,
        mut should_continue: impl FnMut() -> bool,
        mut sleep: impl FnMut(Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>,
    ) -> SyncResult<Option<ScanCursor>> {
        while should_continue() {
            let scan_start = chrono::Utc::now();
            match self.scan(cursor).await {
                Ok(()) => {
                    cursor = Some(ScanCursor::since(scan_start - chrono::Duration::seconds(1)));
                }
                Err(err) => {
                    error!(error = %err, "scan failed; retrying after backoff");
                    sleep(Duration::from_secs(30)).await;
                    continue;
                }
            }
            sleep(tick_interval.min(Duration::from_secs(60))).await;
        }
        Ok(cursor)
    }

    /// Runs exactly one full sweep across every in-scope entity type,
    /// both active and retired passes. Used both by the tick loop and
    /// by the control plane's on-demand "full sweep" command.
    pub async fn scan(&self, cursor: Option<ScanCursor>) -> SyncResult<()> {
        info!("scan starting");
        let mut counts: std::collections::BTreeMap<String, usize> = Default::default();

        let mut entity_types: Vec<&sgcache_schema::EntityTypeDef> = self.schema.entity_types().collect();
        entity_types.sort_by(|a, b| a.name.cmp(&b.name));

        for entity in entity_types {
            if !self.scope.includes(&entity.name) {
                continue;
            }

            let return_fields = entity.cached_field_names().into_iter().map(str::to_string).collect::<Vec<_>>();
            let mut filters: Vec<JsonValue> = Vec::new();
            if let Some(cursor) = cursor {
                filters.push(serde_json::json!(["updated_at", "greater_than", cursor.last_time.to_rfc3339()]));
            }
            if !self.scope.project_ids.is_empty() && entity.name != "ApiUser" && entity.name != "HumanUser" {
                if let Some(project_field) = entity.field("project") {
                    if project_field.data_type.is_cached() {
                        let refs: Vec<JsonValue> = self
                            .scope
                            .project_ids
                            .iter()
                            .map(|id| serde_json::json!({"type": "Project", "id": id}))
                            .collect();
                        filters.push(serde_json::json!(["project", "in", refs]));
                    }
                }
            }

            let mut scanned = 0usize;
            for active in [true, false] {
                let rows = self
                    .upstream
                    .find_all(&SearchRequest {
                        entity_type: entity.name.clone(),
                        filters: serde_json::Value::Array(filters.clone()),
                        fields: return_fields.clone(),
                        retired_only: !active,
                    })
                    .await?;

                for mut row in rows {
                    normalize_date_fields(&mut row, &return_fields);
                    let data = row.as_object().cloned().unwrap_or_default();
                    let id = data.get("id").and_then(|v| v.as_i64());
                    let Some(id) = id else { continue };

                    let mut client = self.pool.get().await?;
                    write::upsert(
                        &self.schema,
                        &mut client,
                        &UpsertRequest {
                            entity_type: entity.name.clone(),
                            id: Some(id),
                            data,
                            origin: UpsertOrigin::Scanner,
                            active: Some(active),
                            last_event_id: None,
                        },
                    )
                    .await?;
                    scanned += 1;
                }
            }
            if scanned > 0 {
                counts.insert(entity.name.clone(), scanned);
            }
        }

        let summary: Vec<String> = counts.iter().map(|(k, v)| format!("{v} {k}s")).collect();
        info!(summary = %summary.join(", "), "scan completed");
        Ok(())
    }
}

/// Normalises any field the upstream returned as an ISO-like datetime
/// string already (this rework's upstream transport only ever carries
/// JSON, so there is no native datetime object to format as in the
/// original — this pass-through exists so a future richer transport
/// has somewhere to plug in real normalisation without touching the
/// scan loop itself).
fn normalize_date_fields(row: &mut JsonValue, _return_fields: &[String]) {
    let _ = row;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_with_no_types_includes_everything() {
        let scope = ScanScope::default();
        assert!(scope.includes("Shot"));
    }

    #[test]
    fn scope_with_types_narrows() {
        let scope = ScanScope {
            types: vec!["Shot".to_string()],
            project_ids: Vec::new(),
        };
        assert!(scope.includes("Shot"));
        assert!(!scope.includes("Task"));
    }
}
