//! `absent` and `non_cacheable`: the two kinds that refuse to
//! participate in storage at all, differing only in how loud that
//! refusal is.
//!
//! `absent` means the upstream schema lists the field but this cache's
//! schema configuration does not cache it: reads silently omit it
//! (`NoFieldData` in the original — here, [`crate::error::PassthroughReason::FieldMissing`]
//! from the extraction path, which the query builder treats as "skip
//! this return field" rather than a hard failure), but a *write*
//! naming it is a client fault when the client requested it directly,
//! and is tolerated when the event follower or scanner originates it
//! (the upstream is authoritative for fields this cache chooses not to
//! track).
//!
//! `non_cacheable` means the field kind itself has no storage mapping
//! (`image`, `url`, `pivot_table`, `serializable`, ...); every
//! operation on it is a passthrough.

use sgcache_schema::FieldKind;
use tokio_postgres::Row;

use crate::error::{ClientFaultReason, StoreResult, UpsertOrigin};
use crate::value::FieldValue;

use super::{FieldContext, FieldStrategy, Predicate, UpsertPlan};

pub struct AbsentField;

impl FieldStrategy for AbsentField {
    fn kind(&self) -> FieldKind {
        FieldKind::Absent
    }

    fn is_cached(&self) -> bool {
        false
    }

    fn select_columns(&self, _ctx: &FieldContext) -> StoreResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn extract(&self, ctx: &FieldContext, _row: &Row, _base_idx: usize) -> StoreResult<FieldValue> {
        Err(ctx.missing_field().into())
    }

    fn prepare_filter(
        &self,
        ctx: &FieldContext,
        _relation: &str,
        _values: &[FieldValue],
    ) -> StoreResult<Predicate> {
        Err(ClientFaultReason::AbsentFieldAccess {
            entity: ctx.entity_type.to_string(),
            field: ctx.field_name.to_string(),
        }
        .into())
    }

    fn prepare_upsert(
        &self,
        ctx: &FieldContext,
        origin: UpsertOrigin,
        _value: &FieldValue,
    ) -> StoreResult<UpsertPlan> {
        match origin {
            UpsertOrigin::Client => Err(ClientFaultReason::AbsentFieldAccess {
                entity: ctx.entity_type.to_string(),
                field: ctx.field_name.to_string(),
            }
            .into()),
            UpsertOrigin::EventFollower | UpsertOrigin::Scanner => Ok(UpsertPlan::default()),
        }
    }
}

pub struct NonCacheableField;

impl FieldStrategy for NonCacheableField {
    fn kind(&self) -> FieldKind {
        FieldKind::NonCacheable
    }

    fn is_cached(&self) -> bool {
        false
    }

    fn select_columns(&self, _ctx: &FieldContext) -> StoreResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn extract(&self, ctx: &FieldContext, _row: &Row, _base_idx: usize) -> StoreResult<FieldValue> {
        Err(ctx.missing_field().into())
    }

    fn prepare_filter(
        &self,
        ctx: &FieldContext,
        relation: &str,
        _values: &[FieldValue],
    ) -> StoreResult<Predicate> {
        Err(ctx.filter_not_implemented(self.kind(), relation).into())
    }

    fn prepare_upsert(
        &self,
        ctx: &FieldContext,
        _origin: UpsertOrigin,
        _value: &FieldValue,
    ) -> StoreResult<UpsertPlan> {
        Err(ctx.missing_field().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FieldContext<'static> {
        FieldContext::new("Shot", "sg_cut_in", "t0")
    }

    #[test]
    fn absent_field_is_not_cached_and_selects_nothing() {
        assert!(!AbsentField.is_cached());
        assert!(AbsentField.select_columns(&ctx()).unwrap().is_empty());
    }

    #[test]
    fn absent_field_read_always_reports_field_missing() {
        assert!(AbsentField.prepare_filter(&ctx(), "is", &[]).is_err());
    }

    #[test]
    fn absent_field_client_write_is_a_client_fault() {
        let result = AbsentField.prepare_upsert(&ctx(), UpsertOrigin::Client, &FieldValue::Int(1));
        assert!(result.is_err());
    }

    #[test]
    fn absent_field_follower_write_is_silently_tolerated() {
        let plan = AbsentField
            .prepare_upsert(&ctx(), UpsertOrigin::EventFollower, &FieldValue::Int(1))
            .unwrap();
        assert!(plan.columns.is_empty());
    }

    #[test]
    fn absent_field_scanner_write_is_silently_tolerated() {
        let plan = AbsentField
            .prepare_upsert(&ctx(), UpsertOrigin::Scanner, &FieldValue::Int(1))
            .unwrap();
        assert!(plan.columns.is_empty());
    }

    #[test]
    fn non_cacheable_field_refuses_every_operation() {
        assert!(NonCacheableField.prepare_filter(&ctx(), "is", &[]).is_err());
        assert!(NonCacheableField
            .prepare_upsert(&ctx(), UpsertOrigin::Client, &FieldValue::Int(1))
            .is_err());
        assert!(!NonCacheableField.is_cached());
    }
}
