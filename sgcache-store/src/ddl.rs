//! Storage schema materialisation: on startup, ensure every entity
//! type's table and every cached field's columns exist, creating them
//! additively and failing fast on an incompatible existing column.
//!
//! Grounded on the column-check-or-create algorithm in the original
//! implementation's field base class: if a column exists its compiled
//! type must match (normalised across a couple of known Postgres
//! reflection quirks); if it does not exist it is added with `ALTER
//! TABLE ... ADD COLUMN`.

use deadpool_postgres::Client;
use sgcache_schema::{EntityTypeDef, FieldKind, Schema};

use crate::error::{StoreError, StoreResult};

/// Maps a field kind to the Postgres column type(s) it materialises as.
/// Returns one entry per column the kind contributes (most kinds
/// contribute one; `entity` contributes two; `multi_entity` and
/// non-storing kinds contribute none here — `multi_entity` gets its own
/// association table, handled separately).
fn columns_for_kind(field_name: &str, kind: FieldKind) -> Vec<(String, &'static str)> {
    match kind {
        FieldKind::Checkbox => vec![(field_name.to_string(), "boolean")],
        FieldKind::Number | FieldKind::Duration | FieldKind::Percent | FieldKind::Timecode => {
            vec![(field_name.to_string(), "integer")]
        }
        FieldKind::Float => vec![(field_name.to_string(), "double precision")],
        FieldKind::Text
        | FieldKind::EntityType
        | FieldKind::Color
        | FieldKind::List
        | FieldKind::StatusList
        | FieldKind::Uuid
        | FieldKind::DateTime
        | FieldKind::Date => vec![(field_name.to_string(), "text")],
        FieldKind::Entity => vec![
            (format!("{field_name}__type"), "character varying(255)"),
            (format!("{field_name}__id"), "integer"),
        ],
        FieldKind::MultiEntity | FieldKind::Absent | FieldKind::NonCacheable => Vec::new(),
    }
}

/// Normalises a couple of known divergences between the type name we
/// ask for and what Postgres reports back on reflection, so a
/// startup-time comparison does not spuriously fail. `information_schema
/// .columns.data_type` never carries a length modifier (it reports
/// `character varying`, not `character varying(255)`; the modifier
/// lives in the separate `character_maximum_length` column), so the
/// parenthesised suffix is stripped before comparing either side.
fn normalize_type_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();
    base.to_string()
}

pub struct SchemaMaterializer<'a> {
    schema: &'a Schema,
}

impl<'a> SchemaMaterializer<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        SchemaMaterializer { schema }
    }

    pub async fn materialize(&self, client: &Client) -> StoreResult<()> {
        for entity in self.schema.entity_types() {
            self.materialize_entity(client, entity).await?;
        }
        Ok(())
    }

    async fn materialize_entity(&self, client: &Client, entity: &EntityTypeDef) -> StoreResult<()> {
        let table = entity.table_name();

        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY,
                    _active BOOLEAN NOT NULL DEFAULT TRUE,
                    _cache_created_at TIMESTAMP,
                    _cache_updated_at TIMESTAMP,
                    _last_log_event_id INTEGER
                )"
            ))
            .await?;

        for (name, spec) in entity.fields() {
            if name == "id" {
                // id is part of the base table definition above.
                continue;
            }
            if !spec.data_type.is_cached() {
                continue;
            }

            if spec.data_type == FieldKind::MultiEntity {
                self.materialize_association_table(client, &table, name)
                    .await?;
                continue;
            }

            for (column, sql_type) in columns_for_kind(name, spec.data_type) {
                self.create_or_check_column(client, &table, &column, sql_type)
                    .await?;
            }
        }

        Ok(())
    }

    async fn materialize_association_table(
        &self,
        client: &Client,
        parent_table: &str,
        field_name: &str,
    ) -> StoreResult<()> {
        let assoc_table = format!("{parent_table}_{field_name}");
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {assoc_table} (
                    id SERIAL PRIMARY KEY,
                    parent_id INTEGER NOT NULL REFERENCES {parent_table}(id),
                    child_type VARCHAR(255) NOT NULL,
                    child_id INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS {assoc_table}_parent_id_idx
                    ON {assoc_table} (parent_id);"
            ))
            .await?;
        Ok(())
    }

    async fn create_or_check_column(
        &self,
        client: &Client,
        table: &str,
        column: &str,
        expected_type: &str,
    ) -> StoreResult<()> {
        let existing = client
            .query_opt(
                "SELECT data_type FROM information_schema.columns \
                 WHERE table_name = $1 AND column_name = $2",
                &[&table, &column],
            )
            .await?;

        match existing {
            None => {
                client
                    .batch_execute(&format!(
                        "ALTER TABLE {table} ADD COLUMN {column} {expected_type}"
                    ))
                    .await?;
                Ok(())
            }
            Some(row) => {
                let existing_type: String = row.get(0);
                let existing_norm = normalize_type_name(&existing_type);
                let expected_norm = normalize_type_name(expected_type);
                if existing_norm != expected_norm {
                    return Err(StoreError::SchemaMismatch {
                        table: table.to_string(),
                        column: column.to_string(),
                        existing: existing_norm,
                        expected: expected_norm,
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varchar_length_modifier_matches_the_bare_form_information_schema_reports() {
        // `information_schema.columns.data_type` never carries the
        // length modifier; the compiled "character varying(255)" we
        // ask `ALTER TABLE` for must still compare equal to the bare
        // "character varying" reflection reports back, or every
        // restart with an existing `entity` field column would fail
        // startup on a false mismatch.
        assert_eq!(
            normalize_type_name("character varying(255)"),
            normalize_type_name("character varying"),
        );
    }

    #[test]
    fn case_differences_are_ignored() {
        assert_eq!(normalize_type_name("INTEGER"), normalize_type_name("integer"));
    }

    #[test]
    fn distinct_base_types_still_mismatch() {
        assert_ne!(normalize_type_name("integer"), normalize_type_name("text"));
    }

    #[test]
    fn entity_field_contributes_type_and_id_columns() {
        let cols = columns_for_kind("assignee", FieldKind::Entity);
        assert_eq!(
            cols,
            vec![
                ("assignee__type".to_string(), "character varying(255)"),
                ("assignee__id".to_string(), "integer"),
            ]
        );
    }

    #[test]
    fn multi_entity_contributes_no_direct_columns() {
        assert!(columns_for_kind("assignees", FieldKind::MultiEntity).is_empty());
    }
}
