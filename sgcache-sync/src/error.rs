use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Store(#[from] sgcache_store::StoreError),

    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),
}

pub type SyncResult<T> = Result<T, SyncError>;
