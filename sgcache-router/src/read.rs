//! The `read` method: decodes the wire payload shape into a
//! `sgcache_store::query::ReadRequest`, runs it, and fabricates the
//! paging envelope the upstream dialect expects.
//!
//! Grounded on `original_source/sgcache/web/api3.py`'s `read` handler
//! and the distilled spec's wire shape: `{type, filters, return_fields,
//! paging: {current_page, entities_per_page}, sorts, return_only}`.

use deadpool_postgres::Client;
use serde_json::Value as JsonValue;
use sgcache_schema::Schema;
use sgcache_store::query::{execute_read, fabricate_entity_count, ReadRequest, SortDirection};

use crate::error::RouterResult;

pub async fn handle_read(schema: &Schema, client: &Client, params: &JsonValue) -> RouterResult<JsonValue> {
    let entity_type = params
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let return_fields: Vec<String> = params
        .get("return_fields")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let sorts: Vec<(String, SortDirection)> = params
        .get("sorts")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|s| {
                    let field = s.get("field_name")?.as_str()?.to_string();
                    let dir = match s.get("direction").and_then(|v| v.as_str()) {
                        Some("desc") => SortDirection::Desc,
                        _ => SortDirection::Asc,
                    };
                    Some((field, dir))
                })
                .collect()
        })
        .unwrap_or_default();

    let entities_per_page = params
        .get("paging")
        .and_then(|p| p.get("entities_per_page"))
        .and_then(|v| v.as_i64());
    let current_page = params
        .get("paging")
        .and_then(|p| p.get("current_page"))
        .and_then(|v| v.as_i64())
        .unwrap_or(1)
        .max(1);
    let offset = entities_per_page.map(|per_page| (current_page - 1) * per_page).unwrap_or(0);

    let return_active = !matches!(params.get("return_only").and_then(|v| v.as_str()), Some("retired"));

    let request = ReadRequest {
        entity_type: entity_type.clone(),
        filters: params.get("filters").cloned().unwrap_or(JsonValue::Null),
        return_fields,
        sorts,
        offset,
        limit: entities_per_page,
        return_active,
    };

    let entities = execute_read(schema, client, &request).await?;
    let entity_count = fabricate_entity_count(request.offset, entities.len(), request.limit);

    Ok(serde_json::json!({
        "entities": entities,
        "paging_info": {"entity_count": entity_count},
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_active_only() {
        let params = serde_json::json!({"type": "Shot"});
        let return_only = params.get("return_only").and_then(|v| v.as_str());
        assert!(!matches!(return_only, Some("retired")));
    }

    #[test]
    fn offset_from_paging() {
        let params = serde_json::json!({"paging": {"current_page": 3, "entities_per_page": 20}});
        let per_page = params.get("paging").and_then(|p| p.get("entities_per_page")).and_then(|v| v.as_i64());
        let page = params.get("paging").and_then(|p| p.get("current_page")).and_then(|v| v.as_i64()).unwrap_or(1);
        let offset = per_page.map(|pp| (page - 1) * pp).unwrap_or(0);
        assert_eq!(offset, 40);
    }
}
