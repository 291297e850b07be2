//! The store's error taxonomy.
//!
//! This crate distinguishes three error kinds, matching the cache's
//! overall error-handling design: [`PassthroughReason`] is a
//! control-flow signal (never logged as a failure, always means
//! "forward the original request upstream"), [`ClientFaultReason`] is a
//! well-formed-but-impossible request, and the remaining
//! [`StoreError::Operational`] variant wraps genuine storage failures.

use thiserror::Error;

/// Why the store could not serve a request locally and the caller
/// should fall back to the upstream. None of these are failures; the
/// router inspects this arm specifically and never surfaces it as an
/// error to the end user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PassthroughReason {
    #[error("entity type {0} is not in the schema")]
    EntityMissing(String),

    #[error("field {entity}.{field} is not in the schema")]
    FieldMissing { entity: String, field: String },

    #[error("relation {relation} is not implemented on {entity}.{field} ({kind:?})")]
    FilterNotImplemented {
        entity: String,
        field: String,
        kind: sgcache_schema::FieldKind,
        relation: String,
    },

    #[error("cannot traverse through {entity}.{field}: not a reference field")]
    JoinNotSupported { entity: String, field: String },
}

/// A request that is well-formed at the transport level but
/// semantically impossible. Surfaced to the caller as a structured
/// `{exception: true, error_code, message}` body, never as an HTTP 5xx.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientFaultReason {
    #[error("{entity}.{field} does not exist")]
    AbsentFieldAccess { entity: String, field: String },

    #[error("more than one value for relation {relation} on {entity}.{field}")]
    TooManyValuesForRelation {
        entity: String,
        field: String,
        relation: String,
    },

    #[error("{entity}.{field} value must be a reference (a {{type, id}} object)")]
    InvalidReference { entity: String, field: String },

    #[error("cannot specify an id for a create; use update or pass create_with_id")]
    IdOnCreateNotAllowed,
}

/// Who initiated a write. Threaded through the write engine so a field
/// strategy (specifically `Absent`) can distinguish a client-originated
/// write, which is a client fault, from one the event follower or
/// scanner originates on the upstream's authority, which is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOrigin {
    Client,
    EventFollower,
    Scanner,
}

/// The master error type for `sgcache-store`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("passthrough: {0}")]
    Passthrough(#[from] PassthroughReason),

    #[error("client fault: {0}")]
    ClientFault(#[from] ClientFaultReason),

    #[error("schema error: {0}")]
    Schema(#[from] sgcache_schema::SchemaError),

    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("schema mismatch on {table}.{column}: existing {existing} != expected {expected}")]
    SchemaMismatch {
        table: String,
        column: String,
        existing: String,
        expected: String,
    },

    #[error("could not create connection pool: {0}")]
    PoolCreate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// True for the passthrough class specifically; used by the router
    /// to decide whether to forward rather than fail the request.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, StoreError::Passthrough(_))
    }

    pub fn is_client_fault(&self) -> bool {
        matches!(self, StoreError::ClientFault(_))
    }
}
