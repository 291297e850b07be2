//! Connection pool configuration for the relational store.

use std::time::Duration;

use deadpool_postgres::{Config, Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use crate::error::{StoreError, StoreResult};

/// Connection parameters for the store's Postgres pool.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "sgcache".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        StoreConfig {
            host: std::env::var("SGCACHE_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SGCACHE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("SGCACHE_DB_NAME").unwrap_or_else(|_| "sgcache".to_string()),
            user: std::env::var("SGCACHE_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("SGCACHE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("SGCACHE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            connect_timeout: Duration::from_secs(
                std::env::var("SGCACHE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    pub fn create_pool(&self) -> StoreResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::PoolCreate(e.to_string()))
    }
}

/// Builds a pool straight from a `postgres://` connection string, for
/// callers (the binary's `AppConfig`) that carry one `database_url`
/// field rather than the discrete host/port/user fields above.
pub fn create_pool_from_url(database_url: &str, max_size: usize) -> StoreResult<Pool> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| StoreError::PoolCreate(e.to_string()))?;
    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(manager)
        .max_size(max_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| StoreError::PoolCreate(e.to_string()))
}
