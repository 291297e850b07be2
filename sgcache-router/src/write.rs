//! The `create`/`update`/`delete`/`revive` methods: each forwards
//! upstream first and then writes the forwarded result through the
//! local store, trusting the upstream's response as ground truth.
//!
//! Grounded on `original_source/sgcache/web/api3.py`'s `create`/
//! `update`/`delete`/`revive` handlers: the local store never
//! originates data for these calls, it only mirrors what upstream just
//! did.

use deadpool_postgres::Object;
use serde_json::Value as JsonValue;
use sgcache_schema::Schema;
use sgcache_store::write::{upsert, set_active, UpsertRequest};
use sgcache_store::UpsertOrigin;
use tracing::warn;

use crate::error::{RouterError, RouterResult};
use crate::upstream::UpstreamForwarder;

/// `create`: augments `return_fields` with every cached field so the
/// upstream response fully seeds the row, forwards, writes through,
/// handles the `Shot` + non-empty `task_template` special case, and
/// trims the surfaced response back down to what the caller asked for.
pub async fn handle_create(
    schema: &Schema,
    client: &mut Object,
    upstream: &dyn UpstreamForwarder,
    params: &JsonValue,
) -> RouterResult<JsonValue> {
    let entity_type = params
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RouterError::UnknownMethod("create".to_string()))?
        .to_string();

    let entity = schema
        .get(&entity_type)
        .ok_or_else(|| sgcache_store::PassthroughReason::EntityMissing(entity_type.clone()))?;

    let requested_fields: Vec<String> = params
        .get("return_fields")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let augmented_fields: Vec<String> = entity.cached_field_names().into_iter().map(str::to_string).collect();

    let mut forward_params = params.clone();
    if let Some(obj) = forward_params.as_object_mut() {
        obj.insert("return_fields".to_string(), serde_json::json!(augmented_fields));
    }

    let upstream_response = upstream.forward("create", forward_params).await?;
    let created = upstream_entity(&upstream_response)?;
    let id = entity_id(&created)?;

    let data = created.as_object().cloned().unwrap_or_default();
    upsert(
        schema,
        client,
        &UpsertRequest {
            entity_type: entity_type.clone(),
            id: Some(id),
            data,
            origin: UpsertOrigin::Client,
            active: Some(true),
            last_event_id: None,
        },
    )
    .await?;

    if entity_type == "Shot" {
        if let Some(template) = find_field_value(params, "task_template") {
            let is_nonempty = !matches!(template, JsonValue::Null) && template.as_i64() != Some(0);
            if is_nonempty {
                if let Err(err) = seed_implicit_tasks(schema, client, upstream, id).await {
                    warn!(error = %err, shot_id = id, "failed to seed implicit tasks from task_template");
                }
            }
        }
    }

    Ok(trim_to_requested(&created, &requested_fields))
}

/// Fetches and writes through any `Task` rows whose `entity` link points
/// at the new Shot, matching upstream's implicit creation of tasks from
/// a non-empty `task_template`.
async fn seed_implicit_tasks(
    schema: &Schema,
    client: &mut Object,
    upstream: &dyn UpstreamForwarder,
    shot_id: i64,
) -> RouterResult<()> {
    let Some(task_entity) = schema.get("Task") else {
        return Ok(());
    };
    let fields: Vec<String> = task_entity.cached_field_names().into_iter().map(str::to_string).collect();

    let response = upstream
        .forward(
            "read",
            serde_json::json!({
                "type": "Task",
                "return_fields": fields,
                "filters": [["entity", "is", {"type": "Shot", "id": shot_id}]],
            }),
        )
        .await?;

    let tasks = response.get("entities").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for task in tasks {
        let Ok(id) = entity_id(&task) else { continue };
        let data = task.as_object().cloned().unwrap_or_default();
        upsert(
            schema,
            client,
            &UpsertRequest {
                entity_type: "Task".to_string(),
                id: Some(id),
                data,
                origin: UpsertOrigin::Client,
                active: Some(true),
                last_event_id: None,
            },
        )
        .await?;
    }
    Ok(())
}

/// `update`: forwards the update unchanged, then writes the forwarded
/// result through against the already-known id.
pub async fn handle_update(
    schema: &Schema,
    client: &mut Object,
    upstream: &dyn UpstreamForwarder,
    params: &JsonValue,
) -> RouterResult<JsonValue> {
    let entity_type = params
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RouterError::UnknownMethod("update".to_string()))?
        .to_string();
    let id = params
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RouterError::UnknownMethod("update".to_string()))?;

    let upstream_response = upstream.forward("update", params.clone()).await?;
    let updated = upstream_entity(&upstream_response)?;
    let data = updated.as_object().cloned().unwrap_or_default();

    upsert(
        schema,
        client,
        &UpsertRequest {
            entity_type,
            id: Some(id),
            data,
            origin: UpsertOrigin::Client,
            active: None,
            last_event_id: None,
        },
    )
    .await?;

    Ok(updated)
}

/// `delete`/`revive`: forward first, then apply the active flag locally
/// with lenient semantics — a miss is logged, not an error, since the
/// row may never have been cached.
pub async fn handle_retire_or_revive(
    schema: &Schema,
    client: &deadpool_postgres::Client,
    upstream: &dyn UpstreamForwarder,
    method: &str,
    params: &JsonValue,
) -> RouterResult<JsonValue> {
    let entity_type = params
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RouterError::UnknownMethod(method.to_string()))?
        .to_string();
    let id = params
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RouterError::UnknownMethod(method.to_string()))?;

    let response = upstream.forward(method, params.clone()).await?;
    let active = method == "revive";

    let found = set_active(client, schema, &entity_type, id, active, None).await?;
    if !found {
        warn!(entity_type, id, method, "row not cached; retire/revive is a local no-op");
    }

    Ok(response)
}

/// Finds the `value` of the `create` payload's `fields` entry whose
/// `field_name` matches, per §6.1's create payload shape
/// (`{type, fields: [{field_name, value}], return_fields: [string]}`) —
/// there is no top-level `data` object to key into directly.
fn find_field_value<'a>(params: &'a JsonValue, field_name: &str) -> Option<&'a JsonValue> {
    params
        .get("fields")
        .and_then(|v| v.as_array())
        .and_then(|fields| {
            fields.iter().find(|f| f.get("field_name").and_then(|v| v.as_str()) == Some(field_name))
        })
        .and_then(|f| f.get("value"))
}

fn upstream_entity(response: &JsonValue) -> RouterResult<JsonValue> {
    response
        .get("entity")
        .cloned()
        .or_else(|| Some(response.clone()))
        .ok_or_else(|| RouterError::Upstream("upstream response carried no entity".to_string()))
}

fn entity_id(entity: &JsonValue) -> RouterResult<i64> {
    entity
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RouterError::Upstream("upstream response carried no id".to_string()))
}

fn trim_to_requested(entity: &JsonValue, requested_fields: &[String]) -> JsonValue {
    let mut obj = serde_json::Map::new();
    if let Some(t) = entity.get("type") {
        obj.insert("type".to_string(), t.clone());
    }
    if let Some(id) = entity.get("id") {
        obj.insert("id".to_string(), id.clone());
    }
    for field in requested_fields {
        if let Some(value) = entity.get(field) {
            obj.insert(field.clone(), value.clone());
        }
    }
    JsonValue::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_response_to_requested_fields_plus_identity() {
        let entity = serde_json::json!({"type": "Shot", "id": 7, "code": "s01", "description": "x"});
        let trimmed = trim_to_requested(&entity, &["code".to_string()]);
        assert_eq!(trimmed, serde_json::json!({"type": "Shot", "id": 7, "code": "s01"}));
    }

    #[test]
    fn upstream_entity_falls_back_to_whole_response() {
        let response = serde_json::json!({"type": "Shot", "id": 1});
        assert_eq!(upstream_entity(&response).unwrap(), response);
    }

    #[test]
    fn find_field_value_locates_task_template_in_the_fields_array() {
        let params = serde_json::json!({
            "type": "Shot",
            "fields": [
                {"field_name": "code", "value": "sh010"},
                {"field_name": "task_template", "value": 42},
            ],
        });
        assert_eq!(find_field_value(&params, "task_template"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn find_field_value_is_none_when_the_field_is_absent() {
        let params = serde_json::json!({
            "type": "Shot",
            "fields": [{"field_name": "code", "value": "sh010"}],
        });
        assert_eq!(find_field_value(&params, "task_template"), None);
    }
}
