//! The entity-type/field registry built from a schema description.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::SchemaError;
use crate::field::{FieldKind, FieldSpec};

/// One entity type: its name and its ordered field map. Field order is
/// preserved from the input description since some callers (the
/// scanner's deterministic-output tests, schema dumps) rely on it.
#[derive(Debug, Clone)]
pub struct EntityTypeDef {
    pub name: String,
    fields: IndexMap<String, FieldSpec>,
}

impl EntityTypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn cached_field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, spec)| spec.data_type.is_cached())
            .map(|(k, _)| k.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn table_name(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Read-only registry of entity types, built once at startup from a
/// schema description and never mutated afterward.
///
/// The input is a mapping from entity-type name to an ordered mapping
/// from field name to field spec, as described in the schema model's
/// input grammar. Every entity type implicitly gets an `id` field of
/// kind `number`.
#[derive(Debug, Clone)]
pub struct Schema {
    entity_types: IndexMap<String, EntityTypeDef>,
}

impl Schema {
    /// Parse a schema description of the shape
    /// `{"EntityTypeName": {"field_name": <field spec>, ...}, ...}`.
    pub fn parse(description: &Value) -> Result<Self, SchemaError> {
        let root = description
            .as_object()
            .ok_or_else(|| SchemaError::MalformedFieldSpec {
                entity: "<root>".to_string(),
                field: "<root>".to_string(),
            })?;

        let mut entity_types = IndexMap::new();

        for (entity_name, raw_fields) in root {
            if entity_types.contains_key(entity_name) {
                return Err(SchemaError::DuplicateEntityType(entity_name.clone()));
            }

            let raw_fields = raw_fields.as_object().ok_or_else(|| {
                SchemaError::MalformedFieldSpec {
                    entity: entity_name.clone(),
                    field: "<fields>".to_string(),
                }
            })?;

            let mut fields: IndexMap<String, FieldSpec> = IndexMap::new();
            // Every entity type implicitly has `id` of kind `number`,
            // inserted first so it is always the first selected column.
            fields.insert(
                "id".to_string(),
                FieldSpec::new(FieldKind::Number, Vec::new()),
            );

            for (field_name, raw_spec) in raw_fields {
                if field_name == "id" {
                    // Explicit `id` entries in the description are
                    // redundant with the implicit one; ignore them
                    // rather than erroring, matching the source's
                    // unconditional `fields['id'] = 'number'` overwrite.
                    continue;
                }
                if fields.contains_key(field_name) {
                    return Err(SchemaError::DuplicateField {
                        entity: entity_name.clone(),
                        field: field_name.clone(),
                    });
                }
                let spec = FieldSpec::parse(entity_name, field_name, raw_spec)?;
                fields.insert(field_name.clone(), spec);
            }

            entity_types.insert(
                entity_name.clone(),
                EntityTypeDef {
                    name: entity_name.clone(),
                    fields,
                },
            );
        }

        Ok(Schema { entity_types })
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityTypeDef> {
        self.entity_types.get(entity_type)
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.entity_types.contains_key(entity_type)
    }

    pub fn entity_type_names(&self) -> impl Iterator<Item = &str> {
        self.entity_types.keys().map(|s| s.as_str())
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityTypeDef> {
        self.entity_types.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        let raw = serde_json::json!({
            "Shot": {
                "code": "text",
                "project": {"data_type": "entity", "entity_types": ["Project"]},
            },
            "Task": {
                "content": "text",
                "entity": {"data_type": "entity", "entity_types": ["Shot", "Asset"]},
                "task_assignees": {"data_type": "multi_entity", "entity_types": ["HumanUser", "Group"]},
            },
        });
        Schema::parse(&raw).unwrap()
    }

    #[test]
    fn every_entity_gets_implicit_id() {
        let schema = sample_schema();
        let shot = schema.get("Shot").unwrap();
        assert_eq!(shot.field("id").unwrap().data_type, FieldKind::Number);
    }

    #[test]
    fn unknown_entity_type_is_none() {
        let schema = sample_schema();
        assert!(schema.get("Nonexistent").is_none());
        assert!(!schema.contains("Nonexistent"));
    }

    #[test]
    fn cached_field_names_are_sorted_and_exclude_id_duplicates() {
        let schema = sample_schema();
        let task = schema.get("Task").unwrap();
        let names = task.cached_field_names();
        assert_eq!(names, vec!["content", "entity", "id", "task_assignees"]);
    }

    #[test]
    fn table_name_is_lowercased() {
        let schema = sample_schema();
        assert_eq!(schema.get("Shot").unwrap().table_name(), "shot");
    }

    #[test]
    fn missing_entity_types_is_fatal() {
        let raw = serde_json::json!({
            "Task": {
                "entity": {"data_type": "entity"},
            },
        });
        let err = Schema::parse(&raw).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingEntityTypes {
                entity: "Task".into(),
                field: "entity".into(),
            }
        );
    }
}
