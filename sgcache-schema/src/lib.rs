//! Entity/field schema model.
//!
//! Parses a user-supplied schema description into a read-only registry
//! of entity types and field specs. This crate owns only the *shape* of
//! the schema; the storage-schema materialisation and the field
//! strategies that know how to query and upsert each kind live in
//! `sgcache-store`, which depends on this crate for [`Schema`].

mod entity;
mod error;
mod field;

pub use entity::{EntityTypeDef, Schema};
pub use error::SchemaError;
pub use field::{FieldKind, FieldSpec};
