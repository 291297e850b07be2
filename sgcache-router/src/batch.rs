//! `batch`: demultiplexes a list of create/update/delete/revive items
//! into one upstream batch call, then replays each response back
//! through the same write-through logic a standalone call would use.
//!
//! Grounded on `original_source/sgcache/web/api3.py`'s `batch` handler,
//! which runs every item as a generator-style coroutine that first
//! yields its forwarded parameters and then resumes with the forwarded
//! result. REDESIGN FLAGS asks for the same two-phase shape without
//! real coroutines: `BatchItem::prepare` produces the request to fold
//! into the one upstream batch call, `BatchItem::complete` consumes
//! that call's matching response and does the local write-through.

use deadpool_postgres::Object;
use serde_json::Value as JsonValue;
use sgcache_schema::Schema;
use sgcache_store::write::{set_active, upsert, UpsertRequest};
use sgcache_store::UpsertOrigin;

use crate::error::{RouterError, RouterResult};
use crate::upstream::UpstreamForwarder;

/// One item's forwarded (method, params) pair, folded into the single
/// upstream batch call.
pub struct ForwardRequest {
    pub method: String,
    pub params: JsonValue,
}

#[derive(Debug, Clone)]
pub struct BatchRequestItem {
    pub request_type: String,
    pub entity_type: String,
    pub data: JsonValue,
}

enum Kind {
    Create,
    Update,
    Delete,
    Revive,
}

fn parse_kind(request_type: &str) -> RouterResult<Kind> {
    match request_type {
        "create" => Ok(Kind::Create),
        "update" => Ok(Kind::Update),
        "delete" => Ok(Kind::Delete),
        "revive" => Ok(Kind::Revive),
        other => Err(RouterError::UnknownMethod(format!("batch item {other}"))),
    }
}

struct BatchItem<'a> {
    kind: Kind,
    entity_type: String,
    id: Option<i64>,
    cached_fields: Vec<String>,
    original: &'a JsonValue,
}

impl<'a> BatchItem<'a> {
    /// Phase one: produces this item's forwarded method/params, with
    /// `create`'s `return_fields` augmented the same way a standalone
    /// create request is.
    fn prepare(&self) -> ForwardRequest {
        match self.kind {
            Kind::Create => {
                let mut params = self.original.clone();
                if let Some(obj) = params.as_object_mut() {
                    obj.insert("return_fields".to_string(), serde_json::json!(self.cached_fields));
                }
                ForwardRequest { method: "create".to_string(), params }
            }
            Kind::Update => ForwardRequest { method: "update".to_string(), params: self.original.clone() },
            Kind::Delete => ForwardRequest { method: "delete".to_string(), params: self.original.clone() },
            Kind::Revive => ForwardRequest { method: "revive".to_string(), params: self.original.clone() },
        }
    }

    /// Phase two: consumes the upstream response matched to this item
    /// and writes it through against the local store.
    async fn complete(&self, schema: &Schema, client: &mut Object, response: &JsonValue) -> RouterResult<JsonValue> {
        match self.kind {
            Kind::Create | Kind::Update => {
                let entity = response
                    .get("entity")
                    .cloned()
                    .unwrap_or_else(|| response.clone());
                let id = entity
                    .get("id")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| RouterError::Upstream("batch item response carried no id".to_string()))?;
                let data = entity.as_object().cloned().unwrap_or_default();
                upsert(
                    schema,
                    client,
                    &UpsertRequest {
                        entity_type: self.entity_type.clone(),
                        id: Some(id),
                        data,
                        origin: UpsertOrigin::Client,
                        active: if matches!(self.kind, Kind::Create) { Some(true) } else { None },
                        last_event_id: None,
                    },
                )
                .await?;
                Ok(entity)
            }
            Kind::Delete | Kind::Revive => {
                let id = self
                    .id
                    .ok_or_else(|| RouterError::Upstream("batch delete/revive item carried no id".to_string()))?;
                let active = matches!(self.kind, Kind::Revive);
                let _ = set_active(client, schema, &self.entity_type, id, active, None).await?;
                Ok(response.clone())
            }
        }
    }
}

/// Runs a whole batch: every item prepares its forwarded call, the
/// router issues one upstream `batch` request for all of them, and
/// every response is replayed back through `complete`. An upstream
/// transport failure is surfaced as a single `RouterError::Upstream`
/// for the whole batch — there is nothing to inject it into, since
/// none of the items have made local changes yet at that point.
pub async fn handle_batch(
    schema: &Schema,
    client: &mut Object,
    upstream: &dyn UpstreamForwarder,
    requests: &[BatchRequestItem],
) -> RouterResult<Vec<JsonValue>> {
    let mut items = Vec::with_capacity(requests.len());
    for req in requests {
        let kind = parse_kind(&req.request_type)?;
        let cached_fields = schema
            .get(&req.entity_type)
            .map(|e| e.cached_field_names().into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        let id = req.data.get("id").and_then(|v| v.as_i64());
        items.push(BatchItem {
            kind,
            entity_type: req.entity_type.clone(),
            id,
            cached_fields,
            original: &req.data,
        });
    }

    let calls: Vec<(String, JsonValue)> = items.iter().map(|i| {
        let fwd = i.prepare();
        (fwd.method, fwd.params)
    }).collect();

    let responses = upstream.forward_batch(calls).await?;
    if responses.len() != items.len() {
        return Err(RouterError::Upstream(format!(
            "batch response had {} entries for {} requests",
            responses.len(),
            items.len()
        )));
    }

    let mut out = Vec::with_capacity(items.len());
    for (item, response) in items.iter().zip(responses.iter()) {
        out.push(item.complete(schema, client, response).await?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_request_type_is_rejected() {
        assert!(parse_kind("frobnicate").is_err());
    }

    #[test]
    fn create_prepare_augments_return_fields() {
        let original = serde_json::json!({"type": "Shot", "data": {"code": "s01"}});
        let item = BatchItem {
            kind: Kind::Create,
            entity_type: "Shot".to_string(),
            id: None,
            cached_fields: vec!["code".to_string(), "id".to_string()],
            original: &original,
        };
        let fwd = item.prepare();
        assert_eq!(fwd.method, "create");
        assert_eq!(fwd.params.get("return_fields").unwrap(), &serde_json::json!(["code", "id"]));
    }
}
