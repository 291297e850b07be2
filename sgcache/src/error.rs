//! The binary's crate-root error, aggregating every lower layer's
//! error type via `#[from]` the way `CaliberError` aggregates
//! `StorageError`/`LlmError`/etc across the teacher's crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing required environment variable {0}")]
    MissingConfig(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("schema error: {0}")]
    Schema(#[from] sgcache_schema::SchemaError),

    #[error("store error: {0}")]
    Store(#[from] sgcache_store::StoreError),

    #[error("router error: {0}")]
    Router(#[from] sgcache_router::RouterError),

    #[error("sync error: {0}")]
    Sync(#[from] sgcache_sync::SyncError),

    #[error("control client error: {0}")]
    Control(#[from] sgcache_control::ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse schema file {path}: {source}")]
    SchemaFile {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;
