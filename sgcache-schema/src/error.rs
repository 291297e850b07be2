//! Errors raised while building a [`crate::Schema`] from its description.

use thiserror::Error;

/// Fatal errors encountered while parsing or validating a schema
/// description. These surface at process startup, before the store or
/// router exist; none of them are recoverable per-request conditions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("entity field {entity}.{field} needs a non-empty entity_types list")]
    MissingEntityTypes { entity: String, field: String },

    #[error("entity type {0} is declared more than once")]
    DuplicateEntityType(String),

    #[error("field {entity}.{field} is declared more than once")]
    DuplicateField { entity: String, field: String },

    #[error("field spec for {entity}.{field} is neither a string nor an object")]
    MalformedFieldSpec { entity: String, field: String },
}
