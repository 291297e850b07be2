//! `entity`: a single-valued reference to a row of another (possibly
//! different) entity type, stored as a `({field}__type, {field}__id)`
//! column pair.
//!
//! Grounded directly on the original implementation's `Entity` field:
//! `is`/`is_not` group candidate values by type and OR the per-type
//! `(type_col = t AND id_col IN (...))` groups together, negation adds
//! an explicit `OR {id_col} IS NULL` so that an unset reference also
//! satisfies "is not this set of values"; `type_is`/`type_is_not`
//! filter on the type column alone.

use std::collections::BTreeMap;

use sgcache_schema::FieldKind;
use tokio_postgres::Row;

use crate::error::{StoreResult, UpsertOrigin};
use crate::value::{FieldValue, Reference};

use super::{FieldContext, FieldStrategy, JoinSpec, Predicate, SqlParam, UpsertColumn, UpsertPlan};

pub struct EntityField;

impl EntityField {
    fn type_column(ctx: &FieldContext) -> String {
        format!("{}__type", ctx.field_name)
    }

    fn id_column(ctx: &FieldContext) -> String {
        format!("{}__id", ctx.field_name)
    }
}

impl FieldStrategy for EntityField {
    fn kind(&self) -> FieldKind {
        FieldKind::Entity
    }

    fn column_width(&self) -> usize {
        2
    }

    fn select_columns(&self, ctx: &FieldContext) -> StoreResult<Vec<String>> {
        Ok(vec![
            ctx.column(&Self::type_column(ctx)),
            ctx.column(&Self::id_column(ctx)),
        ])
    }

    fn extract(&self, _ctx: &FieldContext, row: &Row, base_idx: usize) -> StoreResult<FieldValue> {
        let type_name: Option<String> = row.get(base_idx);
        let id: Option<i32> = row.get(base_idx + 1);
        Ok(match (type_name, id) {
            (Some(t), Some(i)) => FieldValue::Reference(Some(Reference::new(t, i as i64))),
            _ => FieldValue::Null,
        })
    }

    fn prepare_filter(
        &self,
        ctx: &FieldContext,
        relation: &str,
        values: &[FieldValue],
    ) -> StoreResult<Predicate> {
        let type_column = ctx.column(&Self::type_column(ctx));
        let id_column = ctx.column(&Self::id_column(ctx));

        match relation {
            // `in`/`not_in` are the multi-value siblings of `is`/`is_not`
            // and share the same grouped-by-type construction — the
            // original's field base class lists all four against one
            // branch rather than treating `in`/`not_in` separately.
            "is" | "is_not" | "in" | "not_in" => {
                let negate = relation == "is_not" || relation == "not_in";
                let refs: Vec<&Reference> = values
                    .iter()
                    .filter_map(|v| match v {
                        FieldValue::Reference(Some(r)) => Some(r),
                        _ => None,
                    })
                    .collect();
                // An explicit `null` in the value list (as opposed to no
                // values at all) — e.g. `in [null, X]` must match rows
                // whose reference is null *or* equals X.
                let has_explicit_null = values.iter().any(|v| matches!(v, FieldValue::Null));

                if refs.is_empty() {
                    // Only an unset reference was asked for: "is null" /
                    // "is not null".
                    return Ok(if !negate {
                        Predicate::new(format!("{id_column} IS NULL"), Vec::new())
                    } else {
                        Predicate::new(format!("{id_column} IS NOT NULL"), Vec::new())
                    });
                }

                let mut by_type: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
                for r in &refs {
                    by_type.entry(r.type_name.as_str()).or_default().push(r.id);
                }

                let mut clauses = Vec::new();
                let mut params = Vec::new();
                for (type_name, ids) in by_type {
                    let placeholders = vec!["{}"; ids.len()].join(", ");
                    clauses.push(format!(
                        "({type_column} = {{}} AND {id_column} IN ({placeholders}))"
                    ));
                    params.push(SqlParam::Text(type_name.to_string()));
                    params.extend(ids.into_iter().map(SqlParam::Int));
                }

                let positive = format!("({})", clauses.join(" OR "));
                if !negate {
                    Ok(if has_explicit_null {
                        Predicate::new(format!("({positive} OR {id_column} IS NULL)"), params)
                    } else {
                        Predicate::new(positive, params)
                    })
                } else if has_explicit_null {
                    // The null case is already one of the OR'd groups
                    // above, so negating it once is correct — adding a
                    // second `OR IS NULL` here would wrongly make an
                    // explicit `not_in [null, X]` match null rows too.
                    Ok(Predicate::new(format!("NOT ({positive} OR {id_column} IS NULL)"), params))
                } else {
                    Ok(Predicate::new(
                        format!("(NOT {positive} OR {id_column} IS NULL)"),
                        params,
                    ))
                }
            }
            "type_is" | "type_is_not" => {
                let type_name = values
                    .iter()
                    .find_map(|v| match v {
                        FieldValue::Text(s) => Some(s.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| ctx.filter_not_implemented(self.kind(), relation))?;
                if relation == "type_is" {
                    Ok(Predicate::new(
                        format!("{type_column} = {{}}"),
                        vec![SqlParam::Text(type_name)],
                    ))
                } else {
                    // `type_is_not` must also match a wholly unset
                    // reference, same as `is_not`/`not_in` above.
                    Ok(Predicate::new(
                        format!("({type_column} != {{}} OR {id_column} IS NULL)"),
                        vec![SqlParam::Text(type_name)],
                    ))
                }
            }
            _ => Err(ctx.filter_not_implemented(self.kind(), relation).into()),
        }
    }

    fn prepare_join(&self, ctx: &FieldContext) -> StoreResult<JoinSpec> {
        Ok(JoinSpec {
            target_type_column: ctx.column(&Self::type_column(ctx)),
            target_id_column: ctx.column(&Self::id_column(ctx)),
        })
    }

    fn prepare_upsert(
        &self,
        ctx: &FieldContext,
        _origin: UpsertOrigin,
        value: &FieldValue,
    ) -> StoreResult<UpsertPlan> {
        let (type_param, id_param) = match value {
            FieldValue::Reference(Some(r)) => (
                Some(SqlParam::Text(r.type_name.clone())),
                Some(SqlParam::Int(r.id)),
            ),
            _ => (None, None),
        };
        Ok(UpsertPlan {
            columns: vec![
                UpsertColumn {
                    column: Self::type_column(ctx),
                    param: type_param,
                },
                UpsertColumn {
                    column: Self::id_column(ctx),
                    param: id_param,
                },
            ],
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FieldContext<'static> {
        FieldContext::new("Task", "entity", "t0")
    }

    fn shot_ref(id: i64) -> FieldValue {
        FieldValue::Reference(Some(Reference::new("Shot", id)))
    }

    #[test]
    fn is_with_no_references_means_the_column_is_null() {
        let pred = EntityField.prepare_filter(&ctx(), "is", &[FieldValue::Null]).unwrap();
        assert_eq!(pred.sql, "entity__id IS NULL");
        assert!(pred.params.is_empty());
    }

    #[test]
    fn is_not_with_no_references_means_the_column_is_set() {
        let pred = EntityField.prepare_filter(&ctx(), "is_not", &[FieldValue::Null]).unwrap();
        assert_eq!(pred.sql, "entity__id IS NOT NULL");
    }

    #[test]
    fn is_groups_values_by_type_and_ors_the_groups() {
        let pred = EntityField
            .prepare_filter(&ctx(), "is", &[shot_ref(1), shot_ref(2), FieldValue::Reference(Some(Reference::new("Asset", 9)))])
            .unwrap();
        assert!(pred.sql.contains("entity__type = {} AND entity__id IN"));
        // Two distinct types bound as two OR'd groups.
        assert_eq!(pred.sql.matches("entity__type").count(), 2);
    }

    #[test]
    fn is_not_also_matches_an_unset_reference() {
        let pred = EntityField.prepare_filter(&ctx(), "is_not", &[shot_ref(1)]).unwrap();
        assert!(pred.sql.contains("NOT"));
        assert!(pred.sql.contains("entity__id IS NULL"));
    }

    #[test]
    fn type_is_filters_on_the_type_column_alone() {
        let pred = EntityField
            .prepare_filter(&ctx(), "type_is", &[FieldValue::Text("Shot".to_string())])
            .unwrap();
        assert_eq!(pred.sql, "entity__type = {}");
    }

    #[test]
    fn type_is_not_uses_inequality_and_also_matches_an_unset_reference() {
        let pred = EntityField
            .prepare_filter(&ctx(), "type_is_not", &[FieldValue::Text("Shot".to_string())])
            .unwrap();
        assert!(pred.sql.contains("entity__type != {}"));
        assert!(pred.sql.contains("entity__id IS NULL"));
    }

    #[test]
    fn in_relation_is_accepted_as_a_synonym_for_is() {
        let pred = EntityField.prepare_filter(&ctx(), "in", &[shot_ref(1)]).unwrap();
        assert!(pred.sql.contains("entity__type = {} AND entity__id IN"));
        assert!(!pred.sql.contains("NOT"));
    }

    #[test]
    fn not_in_relation_is_accepted_as_a_synonym_for_is_not() {
        let pred = EntityField.prepare_filter(&ctx(), "not_in", &[shot_ref(1)]).unwrap();
        assert!(pred.sql.contains("NOT"));
        assert!(pred.sql.contains("entity__id IS NULL"));
    }

    #[test]
    fn in_with_null_and_a_reference_matches_either_an_unset_or_matching_row() {
        // Boundary behaviour from the spec: `in [null, X]` must match
        // rows whose reference is null OR equals X.
        let pred = EntityField
            .prepare_filter(&ctx(), "in", &[FieldValue::Null, shot_ref(1)])
            .unwrap();
        assert!(pred.sql.contains("entity__id IS NULL"));
        assert!(pred.sql.contains("entity__type = {} AND entity__id IN"));
        assert!(!pred.sql.starts_with("NOT"));
    }

    #[test]
    fn not_in_with_an_explicit_null_does_not_double_up_the_null_branch() {
        let pred = EntityField
            .prepare_filter(&ctx(), "not_in", &[FieldValue::Null, shot_ref(1)])
            .unwrap();
        // Exactly one `IS NULL` mention: the null branch is already
        // inside the negated group, so no second safety-net OR is added.
        assert_eq!(pred.sql.matches("IS NULL").count(), 1);
        assert!(pred.sql.starts_with("NOT"));
    }

    #[test]
    fn type_is_without_a_text_value_is_filter_not_implemented() {
        assert!(EntityField.prepare_filter(&ctx(), "type_is", &[FieldValue::Null]).is_err());
    }

    #[test]
    fn prepare_join_targets_the_type_and_id_columns() {
        let join = EntityField.prepare_join(&ctx()).unwrap();
        assert_eq!(join.target_type_column, "t0.entity__type");
        assert_eq!(join.target_id_column, "t0.entity__id");
    }

    #[test]
    fn upsert_of_an_unset_reference_nulls_both_columns() {
        let plan = EntityField.prepare_upsert(&ctx(), UpsertOrigin::Client, &FieldValue::Null).unwrap();
        assert_eq!(plan.columns.len(), 2);
        assert!(plan.columns.iter().all(|c| c.param.is_none()));
    }
}
