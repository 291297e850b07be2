//! Read-request compilation: turns a `(type, filters, return_fields,
//! sorts, paging)` request into one SQL statement and back into
//! entity-shaped JSON rows.

pub mod builder;
pub mod filter;
pub mod path;

use deadpool_postgres::Client;
use serde_json::Value as JsonValue;
use sgcache_schema::Schema;

use crate::error::StoreResult;
use crate::fields::strategy_for;
use crate::value::FieldValue;

pub use builder::{SelectBuilder, SortDirection};
pub use filter::Filter;

/// One parsed read request, mirroring the upstream JSON-RPC `read`
/// method's argument shape.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub entity_type: String,
    pub filters: JsonValue,
    pub return_fields: Vec<String>,
    pub sorts: Vec<(String, SortDirection)>,
    pub offset: i64,
    pub limit: Option<i64>,
    /// Mirrors the wire request's `return_only` flag: `true` returns
    /// the active-only rows (the default), `false` returns the
    /// retired-only rows.
    pub return_active: bool,
}

/// Runs a read request against the store and returns entity-shaped
/// JSON objects (each carrying at least `type` and `id`).
pub async fn execute_read(
    schema: &Schema,
    client: &Client,
    request: &ReadRequest,
) -> StoreResult<Vec<JsonValue>> {
    let mut builder = SelectBuilder::new(schema, &request.entity_type)?;
    builder.set_return_active_only(request.return_active);

    for name in &request.return_fields {
        builder.add_return_field(name);
    }
    for (name, dir) in &request.sorts {
        builder.add_sort(name, *dir)?;
    }
    if let Some(filter) = Filter::parse(&request.filters) {
        builder.add_filter_tree(&filter)?;
    }
    builder.set_paging(request.offset, request.limit);

    let (sql, params, selections) = builder.finalize()?;
    let rows = builder::fetch_rows(client, &sql, &params).await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i32 = row.get(0);
        let mut obj = serde_json::Map::new();
        obj.insert("type".to_string(), JsonValue::String(request.entity_type.clone()));
        obj.insert("id".to_string(), JsonValue::from(id));

        for sel in &selections {
            // The owning join never fired for this row (e.g. the
            // reference the path traverses through was unset): the
            // field is omitted entirely rather than reported as an
            // explicit JSON null.
            if let Some(witness_idx) = sel.witness_idx {
                let witness: Option<i32> = row.get(witness_idx);
                if witness.is_none() {
                    continue;
                }
            }
            let entity = match schema.get(&sel.entity_type) {
                Some(e) => e,
                None => continue,
            };
            let spec = match entity.field(&sel.field) {
                Some(s) => s,
                None => continue,
            };
            let strategy = strategy_for(spec.data_type);
            let ctx = crate::fields::FieldContext::new(&sel.entity_type, &sel.field, "t0");
            let value = strategy.extract(&ctx, row, sel.base_idx);
            if let Ok(value) = value {
                obj.insert(sel.name.clone(), field_value_to_json(&value));
            }
        }

        out.push(JsonValue::Object(obj));
    }

    Ok(out)
}

fn field_value_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Null => JsonValue::Null,
        FieldValue::Bool(b) => JsonValue::Bool(*b),
        FieldValue::Int(i) => JsonValue::from(*i),
        FieldValue::Float(f) => JsonValue::from(*f),
        FieldValue::Text(s) => JsonValue::String(s.clone()),
        FieldValue::Reference(None) => JsonValue::Null,
        FieldValue::Reference(Some(r)) => {
            serde_json::json!({"type": r.type_name, "id": r.id})
        }
        FieldValue::MultiEntitySet(refs) => JsonValue::Array(
            refs.iter()
                .map(|r| serde_json::json!({"type": r.type_name, "id": r.id}))
                .collect(),
        ),
        FieldValue::MultiEntityDelta(_) => JsonValue::Null,
    }
}

/// Fabricates `paging_info.entity_count` the way the upstream API does:
/// an estimate derived from the page just fetched, not an exact count
/// (a real `COUNT(*)` would defeat the purpose of paging). Mirrors the
/// original read operation's `offset + len(entities)`, bumped by
/// `limit + 1` when the page came back full (signalling "there might
/// be more").
pub fn fabricate_entity_count(offset: i64, returned: usize, limit: Option<i64>) -> i64 {
    let mut count = offset + returned as i64;
    if let Some(limit) = limit {
        if returned as i64 == limit {
            count += limit + 1;
        }
    }
    count
}
