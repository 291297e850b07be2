//! Per-field-kind strategies.
//!
//! The original cache modelled this as one Python class per field kind,
//! inheriting from a common `Field` base. Runtime inheritance doesn't
//! carry over cleanly, so here each kind is a variant of
//! [`FieldStrategy`], an enum dispatching to one of a handful of
//! stateless implementations grouped by shared behaviour rather than by
//! one struct per kind: [`scalar::ScalarField`] covers
//! checkbox/number/duration/percent/timecode/float, [`text::TextField`]
//! covers text and its many aliases plus the date-shaped kinds,
//! [`entity::EntityField`] and [`multi_entity::MultiEntityField`] get
//! their own modules because their join/filter/upsert behaviour is
//! genuinely distinct, and [`special`] covers `absent` and
//! `non_cacheable`, which refuse almost everything.

pub mod entity;
pub mod multi_entity;
pub mod scalar;
pub mod special;
pub mod text;

use sgcache_schema::FieldKind;
use tokio_postgres::Row;

use crate::error::{PassthroughReason, StoreResult, UpsertOrigin};
use crate::value::FieldValue;

/// A bound Postgres query parameter, carried alongside the SQL
/// fragments a strategy builds so the query builder can assign them
/// real `$n` placeholders once the whole statement is assembled.
#[derive(Debug, Clone)]
pub enum SqlParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Where in the statement a field strategy is operating: which entity
/// type and field it was invoked for, and the SQL alias of the table
/// row it should read/write through.
#[derive(Debug, Clone)]
pub struct FieldContext<'a> {
    pub entity_type: &'a str,
    pub field_name: &'a str,
    pub alias: &'a str,
}

impl<'a> FieldContext<'a> {
    pub fn new(entity_type: &'a str, field_name: &'a str, alias: &'a str) -> Self {
        FieldContext {
            entity_type,
            field_name,
            alias,
        }
    }

    pub(crate) fn column(&self, name: &str) -> String {
        format!("{}.{}", self.alias, name)
    }

    pub(crate) fn missing_field(&self) -> PassthroughReason {
        PassthroughReason::FieldMissing {
            entity: self.entity_type.to_string(),
            field: self.field_name.to_string(),
        }
    }

    pub(crate) fn filter_not_implemented(&self, kind: FieldKind, relation: &str) -> PassthroughReason {
        PassthroughReason::FilterNotImplemented {
            entity: self.entity_type.to_string(),
            field: self.field_name.to_string(),
            kind,
            relation: relation.to_string(),
        }
    }
}

/// A WHERE-clause fragment with `{}` standing in for each of `params`,
/// in order. The query builder replaces each placeholder with a real
/// `$n` once it knows the statement's full parameter list.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Predicate {
            sql: sql.into(),
            params,
        }
    }

    pub fn always_true() -> Self {
        Predicate::new("TRUE", Vec::new())
    }

    pub fn always_false() -> Self {
        Predicate::new("FALSE", Vec::new())
    }
}

/// What a field contributes to a JOIN when a path traverses through it.
/// Only reference-shaped fields (`entity`) support this directly;
/// `multi_entity` is handled through [`FieldStrategy::prepare_deep_filter`]
/// instead, since it needs a correlated subquery rather than a plain join.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// The entity type on the far side of the join (used to look up the
    /// next table to join against).
    pub target_type_column: String,
    pub target_id_column: String,
}

/// One column this field contributes to an upsert's `SET`/`INSERT`
/// column list, alongside its bound value.
#[derive(Debug, Clone)]
pub struct UpsertColumn {
    pub column: String,
    pub param: Option<SqlParam>,
}

/// A fully prepared upsert contribution: zero or more plain columns,
/// plus optional association-table side effects for `multi_entity`
/// (the write engine runs these after the row upsert, inside the same
/// transaction).
#[derive(Debug, Clone, Default)]
pub struct UpsertPlan {
    pub columns: Vec<UpsertColumn>,
    pub replace_associations: Option<Vec<crate::value::Reference>>,
    pub add_associations: Vec<crate::value::Reference>,
    pub remove_associations: Vec<crate::value::Reference>,
}

/// Behaviour shared by every field kind. Every method defaults to the
/// "not implemented for this kind" passthrough so a new kind starts out
/// safe; kinds that do support an operation override it.
pub trait FieldStrategy: Send + Sync {
    fn kind(&self) -> FieldKind;

    fn is_cached(&self) -> bool {
        true
    }

    /// How many leading row columns [`FieldStrategy::extract`] consumes.
    fn column_width(&self) -> usize {
        1
    }

    fn select_columns(&self, ctx: &FieldContext) -> StoreResult<Vec<String>>;

    fn extract(&self, ctx: &FieldContext, row: &Row, base_idx: usize) -> StoreResult<FieldValue>;

    fn prepare_order(&self, ctx: &FieldContext) -> StoreResult<String> {
        Ok(ctx.column(ctx.field_name))
    }

    fn prepare_filter(
        &self,
        ctx: &FieldContext,
        relation: &str,
        _values: &[FieldValue],
    ) -> StoreResult<Predicate> {
        Err(ctx.filter_not_implemented(self.kind(), relation).into())
    }

    /// Whether this field can be traversed through in a deep path
    /// (`field.Type.field`). Only `entity` supports this.
    fn prepare_join(&self, ctx: &FieldContext) -> StoreResult<JoinSpec> {
        Err(PassthroughReason::JoinNotSupported {
            entity: ctx.entity_type.to_string(),
            field: ctx.field_name.to_string(),
        }
        .into())
    }

    /// Only `multi_entity` overrides this: a correlated `EXISTS`
    /// subquery fragment for filtering on a to-many relation.
    /// `inner_predicate` is always already in positive form; `negate`
    /// tells the strategy whether the caller stripped a negation off
    /// the original leaf relation (`is_not`, `not_contains`, ...) that
    /// must be applied to the whole `EXISTS` rather than the predicate
    /// inside it.
    fn prepare_deep_filter(
        &self,
        ctx: &FieldContext,
        _negate: bool,
        _target_type: &str,
        _inner_predicate: Predicate,
    ) -> StoreResult<Predicate> {
        Err(ctx.missing_field().into())
    }

    fn prepare_upsert(
        &self,
        ctx: &FieldContext,
        origin: UpsertOrigin,
        value: &FieldValue,
    ) -> StoreResult<UpsertPlan>;
}

/// Compiles the handful of relations common to every scalar-ish field
/// kind (`is`, `is_not`, `in`, `not_in`, `less_than`, `greater_than`).
/// Returns `None` for anything else so the caller can fall back to its
/// own relations (e.g. `Text`'s `starts_with`/`contains`) before giving
/// up and reporting `FilterNotImplemented`.
pub(crate) fn comparison_predicate(
    column: &str,
    relation: &str,
    mut params: Vec<Option<SqlParam>>,
) -> Option<Predicate> {
    match relation {
        "is" => {
            if params.len() != 1 {
                return None;
            }
            Some(match params.pop().unwrap() {
                None => Predicate::new(format!("{column} IS NULL"), Vec::new()),
                Some(p) => Predicate::new(format!("{column} = {{}}"), vec![p]),
            })
        }
        "is_not" => {
            if params.len() != 1 {
                return None;
            }
            Some(match params.pop().unwrap() {
                None => Predicate::new(format!("{column} IS NOT NULL"), Vec::new()),
                Some(p) => Predicate::new(
                    format!("({column} IS NULL OR {column} != {{}})"),
                    vec![p],
                ),
            })
        }
        "in" => {
            let bound: Vec<SqlParam> = params.into_iter().flatten().collect();
            if bound.is_empty() {
                return Some(Predicate::always_false());
            }
            let placeholders = vec!["{}"; bound.len()].join(", ");
            Some(Predicate::new(
                format!("{column} IN ({placeholders})"),
                bound,
            ))
        }
        "not_in" => {
            let bound: Vec<SqlParam> = params.into_iter().flatten().collect();
            if bound.is_empty() {
                return Some(Predicate::always_true());
            }
            let placeholders = vec!["{}"; bound.len()].join(", ");
            Some(Predicate::new(
                format!("({column} IS NULL OR {column} NOT IN ({placeholders}))"),
                bound,
            ))
        }
        "less_than" => {
            if params.len() != 1 {
                return None;
            }
            params.pop().unwrap().map(|p| Predicate::new(format!("{column} < {{}}"), vec![p]))
        }
        "greater_than" => {
            if params.len() != 1 {
                return None;
            }
            params.pop().unwrap().map(|p| Predicate::new(format!("{column} > {{}}"), vec![p]))
        }
        "between" => {
            if params.len() != 2 {
                return None;
            }
            let hi = params.pop().unwrap()?;
            let lo = params.pop().unwrap()?;
            Some(Predicate::new(
                format!("({column} >= {{}} AND {column} <= {{}})"),
                vec![lo, hi],
            ))
        }
        "not_between" => {
            if params.len() != 2 {
                return None;
            }
            let hi = params.pop().unwrap()?;
            let lo = params.pop().unwrap()?;
            Some(Predicate::new(
                format!("({column} IS NULL OR {column} < {{}} OR {column} > {{}})"),
                vec![lo, hi],
            ))
        }
        _ => None,
    }
}

/// Build the strategy implementation for a given field kind.
pub fn strategy_for(kind: FieldKind) -> Box<dyn FieldStrategy> {
    use FieldKind::*;
    match kind {
        Checkbox | Number | Duration | Percent | Timecode | Float => {
            Box::new(scalar::ScalarField::new(kind))
        }
        Text | EntityType | Color | List | StatusList | Uuid | DateTime | Date => {
            Box::new(text::TextField::new(kind))
        }
        Entity => Box::new(entity::EntityField),
        MultiEntity => Box::new(multi_entity::MultiEntityField),
        Absent => Box::new(special::AbsentField),
        NonCacheable => Box::new(special::NonCacheableField),
    }
}
