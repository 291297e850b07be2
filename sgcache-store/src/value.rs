//! The runtime value model used throughout the store: field values as
//! they travel between the wire, the query compiler, and the write
//! engine.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A typed pointer to one row: `(type_name, id)`. Both single-valued
/// `entity` fields and elements of `multi_entity` fields are references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: i64,
}

impl Reference {
    pub fn new(type_name: impl Into<String>, id: i64) -> Self {
        Reference {
            type_name: type_name.into(),
            id,
        }
    }

    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let obj = value.as_object()?;
        let type_name = obj.get("type")?.as_str()?.to_string();
        let id = obj.get("id")?.as_i64()?;
        Some(Reference { type_name, id })
    }
}

/// The internal delta syntax the event follower uses to describe a
/// partial change to a `multi_entity` field, instead of supplying a
/// full replacement set. Mirrors the `{__added__, __removed__}`
/// convention carried over from the upstream's change-event
/// `meta.added`/`meta.removed` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiEntityDelta {
    #[serde(default, rename = "__added__")]
    pub added: Vec<Reference>,
    #[serde(default, rename = "__removed__")]
    pub removed: Vec<Reference>,
}

/// One field value as it flows through upsert and query extraction.
/// Deliberately narrower than raw JSON: it is exactly the set of shapes
/// the field strategies understand.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Reference(Option<Reference>),
    MultiEntitySet(Vec<Reference>),
    MultiEntityDelta(MultiEntityDelta),
}

impl FieldValue {
    /// Convert from the wire JSON shape of a field value to our
    /// internal model. `hint` is the field's kind, needed to
    /// disambiguate e.g. a JSON object that is a `Reference` from one
    /// that is a `MultiEntityDelta`.
    pub fn from_json(value: &JsonValue, kind: sgcache_schema::FieldKind) -> Self {
        use sgcache_schema::FieldKind::*;
        if value.is_null() {
            return FieldValue::Null;
        }
        match kind {
            Checkbox => value.as_bool().map(FieldValue::Bool).unwrap_or(FieldValue::Null),
            Number | Duration | Percent | Timecode => value
                .as_i64()
                .map(FieldValue::Int)
                .unwrap_or(FieldValue::Null),
            Float => value
                .as_f64()
                .map(FieldValue::Float)
                .unwrap_or(FieldValue::Null),
            Text | EntityType | Color | List | StatusList | Uuid | DateTime | Date => value
                .as_str()
                .map(|s| FieldValue::Text(s.to_string()))
                .unwrap_or(FieldValue::Null),
            Entity => FieldValue::Reference(Reference::from_json(value)),
            MultiEntity => {
                if let Some(obj) = value.as_object() {
                    if obj.contains_key("__added__") || obj.contains_key("__removed__") {
                        let delta: MultiEntityDelta =
                            serde_json::from_value(value.clone()).unwrap_or_default();
                        return FieldValue::MultiEntityDelta(delta);
                    }
                }
                let set = value
                    .as_array()
                    .map(|arr| arr.iter().filter_map(Reference::from_json).collect())
                    .unwrap_or_default();
                FieldValue::MultiEntitySet(set)
            }
            Absent | NonCacheable => FieldValue::Null,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgcache_schema::FieldKind;

    #[test]
    fn entity_value_parses_reference() {
        let raw = serde_json::json!({"type": "Shot", "id": 7});
        let value = FieldValue::from_json(&raw, FieldKind::Entity);
        assert_eq!(value, FieldValue::Reference(Some(Reference::new("Shot", 7))));
    }

    #[test]
    fn null_entity_value_is_null_reference() {
        let value = FieldValue::from_json(&serde_json::Value::Null, FieldKind::Entity);
        assert_eq!(value, FieldValue::Null);
    }

    #[test]
    fn multi_entity_delta_distinguished_from_full_set() {
        let delta_raw = serde_json::json!({
            "__added__": [{"type": "HumanUser", "id": 1}],
            "__removed__": [],
        });
        let value = FieldValue::from_json(&delta_raw, FieldKind::MultiEntity);
        match value {
            FieldValue::MultiEntityDelta(d) => {
                assert_eq!(d.added, vec![Reference::new("HumanUser", 1)]);
                assert!(d.removed.is_empty());
            }
            other => panic!("expected delta, got {other:?}"),
        }

        let full_raw = serde_json::json!([{"type": "HumanUser", "id": 1}]);
        let value = FieldValue::from_json(&full_raw, FieldKind::MultiEntity);
        assert_eq!(
            value,
            FieldValue::MultiEntitySet(vec![Reference::new("HumanUser", 1)])
        );
    }
}
