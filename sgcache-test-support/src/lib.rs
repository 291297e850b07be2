//! Shared fixtures for the sgcache workspace's test suites: a minimal
//! schema builder and an in-memory fake standing in for the upstream
//! JSON-RPC endpoint, used the way `caliber-storage`'s
//! `MockCacheBackend`/`MockStorageFetcher` stand in for a durable store
//! in its read-through cache tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sgcache_schema::Schema;
use sgcache_router::{RouterError, RouterResult, UpstreamForwarder};
use sgcache_sync::{EventLogEntry, SearchRequest, SyncError, SyncResult, UpstreamClient};

/// A small schema covering the entity types exercised by the
/// workspace's read/write/sync tests: `Project`, `Shot`, `Asset`,
/// `Task`, and `HumanUser`.
pub fn fixture_schema() -> Schema {
    let raw = serde_json::json!({
        "Project": {
            "name": "text",
        },
        "Shot": {
            "code": "text",
            "description": "text",
            "project": {"data_type": "entity", "entity_types": ["Project"]},
            "tasks": {"data_type": "multi_entity", "entity_types": ["Task"]},
        },
        "Asset": {
            "code": "text",
            "project": {"data_type": "entity", "entity_types": ["Project"]},
        },
        "Task": {
            "content": "text",
            "entity": {"data_type": "entity", "entity_types": ["Shot", "Asset"]},
            "project": {"data_type": "entity", "entity_types": ["Project"]},
        },
        "HumanUser": {
            "name": "text",
        },
    });
    Schema::parse(&raw).expect("fixture schema is well-formed")
}

/// An in-memory stand-in for the upstream endpoint, shared by both the
/// sync subsystem's `UpstreamClient` and the router's
/// `UpstreamForwarder` traits so one fixture drives tests across both
/// crates.
#[derive(Default)]
pub struct FakeUpstream {
    entities: Mutex<HashMap<(String, i64), JsonValue>>,
    events: Mutex<Vec<EventLogEntry>>,
    queued_responses: Mutex<HashMap<String, VecDeque<JsonValue>>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one entity, retrievable by `find_one`/`find_all` and as
    /// the default `forward("create"/"update", ...)` response target.
    pub fn put_entity(&self, entity_type: &str, id: i64, mut data: JsonValue) {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("type".to_string(), JsonValue::String(entity_type.to_string()));
            obj.insert("id".to_string(), JsonValue::from(id));
        }
        self.entities
            .lock()
            .unwrap()
            .insert((entity_type.to_string(), id), data);
    }

    pub fn push_event(&self, event: EventLogEntry) {
        self.events.lock().unwrap().push(event);
    }

    /// Queues the next response `forward(method, ...)` returns, FIFO
    /// per method name. Lets a router test script a specific upstream
    /// reply (e.g. a `create` response carrying the assigned id)
    /// without standing up a real endpoint.
    pub fn queue_response(&self, method: &str, response: JsonValue) {
        self.queued_responses
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstream {
    async fn find_one(&self, entity_type: &str, id: i64, _fields: &[String]) -> SyncResult<Option<JsonValue>> {
        Ok(self.entities.lock().unwrap().get(&(entity_type.to_string(), id)).cloned())
    }

    async fn find_all(&self, request: &SearchRequest) -> SyncResult<Vec<JsonValue>> {
        let entities = self.entities.lock().unwrap();
        Ok(entities
            .iter()
            .filter(|((t, _), _)| t == &request.entity_type)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn iter_events(
        &self,
        since_id: Option<i64>,
        _since_time: Option<String>,
        limit: i64,
    ) -> SyncResult<Vec<EventLogEntry>> {
        let events = self.events.lock().unwrap();
        let floor = since_id.unwrap_or(0);
        Ok(events
            .iter()
            .filter(|e| e.id > floor)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UpstreamForwarder for FakeUpstream {
    async fn forward(&self, method: &str, params: JsonValue) -> RouterResult<JsonValue> {
        if let Some(queued) = self.queued_responses.lock().unwrap().get_mut(method).and_then(VecDeque::pop_front) {
            return Ok(queued);
        }
        match method {
            "delete" | "revive" => Ok(serde_json::json!({"ok": true})),
            other => Err(RouterError::Upstream(format!("no queued response for {other}"))),
        }
    }

    async fn forward_batch(&self, calls: Vec<(String, JsonValue)>) -> RouterResult<Vec<JsonValue>> {
        let mut out = Vec::with_capacity(calls.len());
        for (method, params) in calls {
            out.push(self.forward(&method, params).await?);
        }
        Ok(out)
    }
}

/// Builds an [`EventLogEntry`] with the fields tests typically need to
/// override, defaulting the rest.
pub fn change_event(id: i64, entity_type: &str, entity_id: i64, attribute: &str, new_value: JsonValue) -> EventLogEntry {
    EventLogEntry {
        id,
        event_type: format!("Shotgun_{entity_type}_Change"),
        entity_type: Some(entity_type.to_string()),
        entity_id: Some(entity_id),
        entity: Some(serde_json::json!({"type": entity_type, "id": entity_id})),
        meta: serde_json::json!({"attribute_name": attribute, "new_value": new_value}),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        project: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_one_returns_seeded_entity() {
        let upstream = FakeUpstream::new();
        upstream.put_entity("Shot", 1, serde_json::json!({"code": "s01"}));
        let found = upstream.find_one("Shot", 1, &[]).await.unwrap();
        assert_eq!(found.unwrap().get("code").unwrap(), "s01");
    }

    #[tokio::test]
    async fn iter_events_respects_since_id_and_limit() {
        let upstream = FakeUpstream::new();
        for id in 1..=5 {
            upstream.push_event(change_event(id, "Shot", 1, "code", serde_json::json!("x")));
        }
        let batch = upstream.iter_events(Some(2), None, 2).await.unwrap();
        assert_eq!(batch.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn forward_returns_queued_response_once() {
        let upstream = FakeUpstream::new();
        upstream.queue_response("create", serde_json::json!({"entity": {"type": "Shot", "id": 9}}));
        let response = UpstreamForwarder::forward(&upstream, "create", serde_json::json!({})).await.unwrap();
        assert_eq!(response.get("entity").unwrap().get("id").unwrap(), 9);
        assert!(UpstreamForwarder::forward(&upstream, "create", serde_json::json!({})).await.is_err());
    }
}
