//! `checkbox`, `number`, `duration`, `percent`, `timecode`, `float`.
//!
//! These share one storage/filter shape in the original implementation
//! (`Duration`/`Percent`/`Timecode` are empty `Number` subclasses;
//! `Float` only differs in its column type), so they share one strategy
//! parameterised by kind.

use sgcache_schema::FieldKind;
use tokio_postgres::Row;

use crate::error::{StoreResult, UpsertOrigin};
use crate::value::FieldValue;

use super::{comparison_predicate, FieldContext, FieldStrategy, Predicate, SqlParam, UpsertColumn, UpsertPlan};

pub struct ScalarField {
    kind: FieldKind,
}

impl ScalarField {
    pub fn new(kind: FieldKind) -> Self {
        ScalarField { kind }
    }

    fn param(&self, value: &FieldValue) -> Option<SqlParam> {
        match value {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(SqlParam::Bool(*b)),
            FieldValue::Int(i) => Some(SqlParam::Int(*i)),
            FieldValue::Float(f) => Some(SqlParam::Float(*f)),
            _ => None,
        }
    }
}

impl FieldStrategy for ScalarField {
    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn select_columns(&self, ctx: &FieldContext) -> StoreResult<Vec<String>> {
        Ok(vec![ctx.column(ctx.field_name)])
    }

    fn extract(&self, _ctx: &FieldContext, row: &Row, base_idx: usize) -> StoreResult<FieldValue> {
        let value = match self.kind {
            FieldKind::Checkbox => row
                .get::<_, Option<bool>>(base_idx)
                .map(FieldValue::Bool)
                .unwrap_or(FieldValue::Null),
            FieldKind::Number | FieldKind::Duration | FieldKind::Percent | FieldKind::Timecode => row
                .get::<_, Option<i32>>(base_idx)
                .map(|i| FieldValue::Int(i as i64))
                .unwrap_or(FieldValue::Null),
            FieldKind::Float => row
                .get::<_, Option<f64>>(base_idx)
                .map(FieldValue::Float)
                .unwrap_or(FieldValue::Null),
            _ => unreachable!("ScalarField only constructed for scalar kinds"),
        };
        Ok(value)
    }

    fn prepare_filter(
        &self,
        ctx: &FieldContext,
        relation: &str,
        values: &[FieldValue],
    ) -> StoreResult<Predicate> {
        let column = ctx.column(ctx.field_name);
        let params = values.iter().map(|v| self.param(v)).collect();
        comparison_predicate(&column, relation, params)
            .ok_or_else(|| ctx.filter_not_implemented(self.kind(), relation).into())
    }

    fn prepare_upsert(
        &self,
        ctx: &FieldContext,
        _origin: UpsertOrigin,
        value: &FieldValue,
    ) -> StoreResult<UpsertPlan> {
        Ok(UpsertPlan {
            columns: vec![UpsertColumn {
                column: ctx.field_name.to_string(),
                param: self.param(value),
            }],
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FieldContext<'static> {
        FieldContext::new("Shot", "sg_cut_duration", "t0")
    }

    #[test]
    fn between_is_inclusive_of_both_endpoints() {
        let field = ScalarField::new(FieldKind::Number);
        let pred = field
            .prepare_filter(&ctx(), "between", &[FieldValue::Int(10), FieldValue::Int(20)])
            .unwrap();
        assert!(pred.sql.contains(">="));
        assert!(pred.sql.contains("<="));
        assert_eq!(pred.params.len(), 2);
    }

    #[test]
    fn in_with_empty_values_is_always_false() {
        let field = ScalarField::new(FieldKind::Number);
        let pred = field.prepare_filter(&ctx(), "in", &[]).unwrap();
        assert_eq!(pred.sql, "FALSE");
    }

    #[test]
    fn not_in_with_empty_values_is_always_true() {
        let field = ScalarField::new(FieldKind::Number);
        let pred = field.prepare_filter(&ctx(), "not_in", &[]).unwrap();
        assert_eq!(pred.sql, "TRUE");
    }

    #[test]
    fn unsupported_relation_is_filter_not_implemented() {
        let field = ScalarField::new(FieldKind::Number);
        assert!(field.prepare_filter(&ctx(), "contains", &[FieldValue::Int(1)]).is_err());
    }
}
