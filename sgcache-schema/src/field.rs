//! Field kinds and field specs.
//!
//! A field spec in the raw schema description is either a bare string
//! (the data kind, e.g. `"number"`) or an object `{data_type,
//! entity_types?}`. Both forms normalise into [`FieldSpec`].

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// The closed set of data kinds a field can have, plus the
/// catch-all `NonCacheable` kind used for anything this cache does not
/// recognise. Unlike most of the closed set, `NonCacheable` is never
/// produced by an explicit schema entry; it is what parsing falls back
/// to for an unrecognised `data_type` string, so that future upstream
/// field kinds degrade to passthrough rather than refusing to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Checkbox,
    Number,
    Duration,
    Percent,
    Timecode,
    Float,
    Text,
    EntityType,
    Color,
    List,
    StatusList,
    Uuid,
    DateTime,
    Date,
    Entity,
    MultiEntity,
    Absent,
    NonCacheable,
}

impl FieldKind {
    /// Parse the `data_type` string from a schema description. Never
    /// fails: an unrecognised string becomes [`FieldKind::NonCacheable`].
    pub fn parse(data_type: &str) -> Self {
        match data_type {
            "checkbox" => FieldKind::Checkbox,
            "number" => FieldKind::Number,
            "duration" => FieldKind::Duration,
            "percent" => FieldKind::Percent,
            "timecode" => FieldKind::Timecode,
            "float" => FieldKind::Float,
            "text" => FieldKind::Text,
            "entity_type" => FieldKind::EntityType,
            "color" => FieldKind::Color,
            "list" => FieldKind::List,
            "status_list" => FieldKind::StatusList,
            "uuid" => FieldKind::Uuid,
            "date_time" => FieldKind::DateTime,
            "date" => FieldKind::Date,
            "entity" => FieldKind::Entity,
            "multi_entity" => FieldKind::MultiEntity,
            "absent" => FieldKind::Absent,
            _ => FieldKind::NonCacheable,
        }
    }

    /// Does this kind require a non-empty `entity_types` list?
    pub fn requires_entity_types(self) -> bool {
        matches!(self, FieldKind::Entity | FieldKind::MultiEntity)
    }

    /// Is this field persisted and queryable at all? `Absent` and
    /// `NonCacheable` fields participate in neither storage nor the
    /// query compiler.
    pub fn is_cached(self) -> bool {
        !matches!(self, FieldKind::Absent | FieldKind::NonCacheable)
    }
}

/// The normalised spec for one field: its kind, and (for `entity`/
/// `multi_entity` fields) the set of entity types it may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub data_type: FieldKind,
    pub entity_types: Vec<String>,
}

impl FieldSpec {
    pub fn new(data_type: FieldKind, entity_types: Vec<String>) -> Self {
        FieldSpec {
            data_type,
            entity_types,
        }
    }

    /// Parse one field spec from its raw JSON form (a bare string or an
    /// object with `data_type` and optional `entity_types`).
    pub fn parse(
        entity: &str,
        field: &str,
        raw: &serde_json::Value,
    ) -> Result<Self, SchemaError> {
        let (data_type_str, entity_types) = match raw {
            serde_json::Value::String(s) => (s.clone(), Vec::new()),
            serde_json::Value::Object(map) => {
                let data_type = map
                    .get("data_type")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| SchemaError::MalformedFieldSpec {
                        entity: entity.to_string(),
                        field: field.to_string(),
                    })?
                    .to_string();
                let entity_types = map
                    .get("entity_types")
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                (data_type, entity_types)
            }
            _ => {
                return Err(SchemaError::MalformedFieldSpec {
                    entity: entity.to_string(),
                    field: field.to_string(),
                })
            }
        };

        let data_type = FieldKind::parse(&data_type_str);
        if data_type.requires_entity_types() && entity_types.is_empty() {
            return Err(SchemaError::MissingEntityTypes {
                entity: entity.to_string(),
                field: field.to_string(),
            });
        }

        Ok(FieldSpec::new(data_type, entity_types))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_non_cacheable() {
        assert_eq!(FieldKind::parse("some_future_kind"), FieldKind::NonCacheable);
    }

    #[test]
    fn known_kinds_roundtrip() {
        assert_eq!(FieldKind::parse("number"), FieldKind::Number);
        assert_eq!(FieldKind::parse("multi_entity"), FieldKind::MultiEntity);
        assert_eq!(FieldKind::parse("date_time"), FieldKind::DateTime);
    }

    #[test]
    fn bare_string_spec_parses() {
        let raw = serde_json::json!("number");
        let spec = FieldSpec::parse("Shot", "id", &raw).unwrap();
        assert_eq!(spec.data_type, FieldKind::Number);
        assert!(spec.entity_types.is_empty());
    }

    #[test]
    fn entity_field_requires_entity_types() {
        let raw = serde_json::json!({"data_type": "entity"});
        let err = FieldSpec::parse("Task", "entity", &raw).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingEntityTypes {
                entity: "Task".into(),
                field: "entity".into()
            }
        );
    }

    #[test]
    fn entity_field_with_types_parses() {
        let raw = serde_json::json!({"data_type": "entity", "entity_types": ["Shot", "Asset"]});
        let spec = FieldSpec::parse("Task", "entity", &raw).unwrap();
        assert_eq!(spec.data_type, FieldKind::Entity);
        assert_eq!(spec.entity_types, vec!["Shot".to_string(), "Asset".to_string()]);
    }
}
