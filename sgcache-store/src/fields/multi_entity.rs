//! `multi_entity`: a to-many reference field backed by an association
//! table (`{parent_table}_{field}`, with `parent_id`/`child_type`/
//! `child_id`), materialised by [`crate::ddl`].
//!
//! Grounded on the original implementation's `MultiEntity` field:
//! selection aggregates the association rows for each parent
//! (`array_agg`/`group_concat` there; a `json_agg` correlated subquery
//! here, read back as a JSON array of `{type, id}` objects rather than
//! a delimited string); a plain `is`/`is_not` filter joins the
//! association table directly; a *deep* filter (traversing through the
//! relation into the target type's own fields) instead builds a
//! correlated `EXISTS` subquery, stripping a leading `not_`/`not` from
//! the relation and lifting it to negate the whole `EXISTS` rather than
//! the inner condition. Upsert accepts either a full replacement set or
//! an `{__added__, __removed__}` delta and schedules the corresponding
//! association-table side effects for the write engine to apply after
//! the row upsert, inside the same transaction.

use sgcache_schema::FieldKind;
use tokio_postgres::Row;

use crate::error::{StoreResult, UpsertOrigin};
use crate::value::FieldValue;

use super::{FieldContext, FieldStrategy, Predicate, UpsertPlan};

pub struct MultiEntityField;

impl MultiEntityField {
    fn assoc_table(ctx: &FieldContext) -> String {
        format!("{}_{}", ctx.entity_type.to_lowercase(), ctx.field_name)
    }
}

impl FieldStrategy for MultiEntityField {
    fn kind(&self) -> FieldKind {
        FieldKind::MultiEntity
    }

    fn select_columns(&self, ctx: &FieldContext) -> StoreResult<Vec<String>> {
        let assoc = Self::assoc_table(ctx);
        Ok(vec![format!(
            "(SELECT json_agg(json_build_object('type', a.child_type, 'id', a.child_id)) \
              FROM {assoc} a WHERE a.parent_id = {}.id)",
            ctx.column("id")
        )])
    }

    fn extract(&self, _ctx: &FieldContext, row: &Row, base_idx: usize) -> StoreResult<FieldValue> {
        let json: Option<serde_json::Value> = row.get(base_idx);
        let refs = json
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(crate::value::Reference::from_json)
            .collect();
        Ok(FieldValue::MultiEntitySet(refs))
    }

    fn prepare_filter(
        &self,
        ctx: &FieldContext,
        relation: &str,
        values: &[FieldValue],
    ) -> StoreResult<Predicate> {
        match relation {
            "is" | "is_not" => {
                let assoc = Self::assoc_table(ctx);
                let refs: Vec<&crate::value::Reference> = values
                    .iter()
                    .filter_map(|v| match v {
                        FieldValue::Reference(Some(r)) => Some(r),
                        _ => None,
                    })
                    .collect();
                if refs.is_empty() {
                    return Err(ctx.filter_not_implemented(self.kind(), relation).into());
                }
                let mut clauses = Vec::new();
                let mut params = Vec::new();
                for r in refs {
                    clauses.push("(a.child_type = {} AND a.child_id = {})".to_string());
                    params.push(super::SqlParam::Text(r.type_name.clone()));
                    params.push(super::SqlParam::Int(r.id));
                }
                let exists = format!(
                    "EXISTS (SELECT 1 FROM {assoc} a WHERE a.parent_id = {} AND ({}))",
                    ctx.column("id"),
                    clauses.join(" OR ")
                );
                Ok(if relation == "is" {
                    Predicate::new(exists, params)
                } else {
                    Predicate::new(format!("NOT {exists}"), params)
                })
            }
            // `type_is`/`type_is_not`: existence of an association row
            // of the given `child_type`, irrespective of which specific
            // child it is — the set-membership analogue of `entity`'s
            // own `type_is`/`type_is_not`.
            "type_is" | "type_is_not" => {
                let assoc = Self::assoc_table(ctx);
                let type_name = values
                    .iter()
                    .find_map(|v| match v {
                        FieldValue::Text(s) => Some(s.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| ctx.filter_not_implemented(self.kind(), relation))?;
                let exists = format!(
                    "EXISTS (SELECT 1 FROM {assoc} a WHERE a.parent_id = {} AND a.child_type = {{}})",
                    ctx.column("id"),
                );
                let params = vec![super::SqlParam::Text(type_name)];
                Ok(if relation == "type_is" {
                    Predicate::new(exists, params)
                } else {
                    Predicate::new(format!("NOT {exists}"), params)
                })
            }
            _ => Err(ctx.filter_not_implemented(self.kind(), relation).into()),
        }
    }

    /// Builds the `EXISTS` wrapper for a deep filter through this
    /// relation. The query builder has already stripped any negation
    /// off the leaf relation (`is_not` -> `is`, `not_contains` ->
    /// `contains`, ...) and compiled `inner_predicate` in positive form
    /// against the deep-join alias `t_deep`; this just wraps it in the
    /// correlated EXISTS and negates the whole thing when `negate` is
    /// set, matching the original's negation-lifting semantics for
    /// to-many traversal ("no member satisfies the positive form").
    fn prepare_deep_filter(
        &self,
        ctx: &FieldContext,
        negate: bool,
        target_type: &str,
        inner_predicate: Predicate,
    ) -> StoreResult<Predicate> {
        let assoc = Self::assoc_table(ctx);
        let exists = format!(
            "EXISTS (SELECT 1 FROM {assoc} a \
              JOIN {target_table} t_deep ON t_deep.id = a.child_id \
              WHERE a.parent_id = {parent_id} AND a.child_type = {{}} AND ({inner}))",
            target_table = target_type.to_lowercase(),
            parent_id = ctx.column("id"),
            inner = inner_predicate.sql,
        );
        let mut params = vec![super::SqlParam::Text(target_type.to_string())];
        params.extend(inner_predicate.params);

        Ok(if negate {
            Predicate::new(format!("NOT {exists}"), params)
        } else {
            Predicate::new(exists, params)
        })
    }

    fn prepare_upsert(
        &self,
        ctx: &FieldContext,
        _origin: UpsertOrigin,
        value: &FieldValue,
    ) -> StoreResult<UpsertPlan> {
        match value {
            FieldValue::MultiEntitySet(refs) => Ok(UpsertPlan {
                columns: Vec::new(),
                replace_associations: Some(refs.clone()),
                add_associations: Vec::new(),
                remove_associations: Vec::new(),
            }),
            FieldValue::MultiEntityDelta(delta) => Ok(UpsertPlan {
                columns: Vec::new(),
                replace_associations: None,
                add_associations: delta.added.clone(),
                remove_associations: delta.removed.clone(),
            }),
            FieldValue::Null => Ok(UpsertPlan {
                columns: Vec::new(),
                replace_associations: Some(Vec::new()),
                add_associations: Vec::new(),
                remove_associations: Vec::new(),
            }),
            _ => Err(ctx.missing_field().into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Reference;

    fn ctx() -> FieldContext<'static> {
        FieldContext::new("Shot", "task_assignees", "t0")
    }

    fn one_ref(type_name: &str, id: i64) -> FieldValue {
        FieldValue::Reference(Some(Reference {
            type_name: type_name.to_string(),
            id,
        }))
    }

    #[test]
    fn plain_is_builds_positive_exists_joined_on_association_table() {
        let pred = MultiEntityField
            .prepare_filter(&ctx(), "is", &[one_ref("HumanUser", 7)])
            .unwrap();
        assert!(pred.sql.starts_with("EXISTS"));
        assert!(!pred.sql.contains("NOT EXISTS"));
        assert!(pred.sql.contains("shot_task_assignees"));
    }

    #[test]
    fn type_is_filters_by_association_child_type_alone() {
        let pred = MultiEntityField
            .prepare_filter(&ctx(), "type_is", &[FieldValue::Text("HumanUser".to_string())])
            .unwrap();
        assert!(pred.sql.starts_with("EXISTS"));
        assert!(pred.sql.contains("a.child_type = {}"));
        assert!(!pred.sql.contains("a.child_id"));
    }

    #[test]
    fn type_is_not_wraps_the_exists_in_not() {
        let pred = MultiEntityField
            .prepare_filter(&ctx(), "type_is_not", &[FieldValue::Text("Group".to_string())])
            .unwrap();
        assert!(pred.sql.starts_with("NOT EXISTS"));
    }

    #[test]
    fn plain_is_not_wraps_the_exists_in_not() {
        let pred = MultiEntityField
            .prepare_filter(&ctx(), "is_not", &[one_ref("HumanUser", 7)])
            .unwrap();
        assert!(pred.sql.starts_with("NOT EXISTS"));
    }

    #[test]
    fn is_with_no_bound_references_is_filter_not_implemented() {
        assert!(MultiEntityField
            .prepare_filter(&ctx(), "is", &[FieldValue::Null])
            .is_err());
    }

    #[test]
    fn deep_filter_without_negation_does_not_wrap_in_not() {
        let inner = Predicate::new("t_deep.id = {}", vec![super::super::SqlParam::Int(3)]);
        let pred = MultiEntityField
            .prepare_deep_filter(&ctx(), false, "HumanUser", inner)
            .unwrap();
        assert!(pred.sql.starts_with("EXISTS"));
        assert!(!pred.sql.contains("NOT EXISTS"));
        assert!(pred.sql.contains("t_deep.id ="));
        // target_type param first, then the inner predicate's own params.
        assert_eq!(pred.params.len(), 2);
    }

    #[test]
    fn deep_filter_with_negation_lifts_not_around_the_whole_exists() {
        // Reproduces the `task_assignees.HumanUser.id is_not 3` shape: the
        // query builder has already rewritten `is_not` to a positive `id =
        // 3` inner predicate and passed `negate = true` here, so this must
        // read "no assignee has id 3", not "some assignee has id != 3".
        let inner = Predicate::new("t_deep.id = {}", vec![super::super::SqlParam::Int(3)]);
        let pred = MultiEntityField
            .prepare_deep_filter(&ctx(), true, "HumanUser", inner)
            .unwrap();
        assert!(pred.sql.starts_with("NOT EXISTS"));
        assert!(pred.sql.contains("t_deep.id ="));
    }

    #[test]
    fn deep_filter_scopes_to_the_target_type_via_child_type() {
        let inner = Predicate::new("TRUE", Vec::new());
        let pred = MultiEntityField
            .prepare_deep_filter(&ctx(), false, "HumanUser", inner)
            .unwrap();
        assert!(pred.sql.contains("a.child_type = {}"));
        match pred.params.first() {
            Some(super::super::SqlParam::Text(t)) => assert_eq!(t, "HumanUser"),
            other => panic!("expected target type param first, got {other:?}"),
        }
    }
}
