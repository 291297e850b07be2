//! Process-wide configuration, resolved once at startup from the
//! environment into an immutable [`AppConfig`].
//!
//! Mirrors `caliber-api::config::ApiConfig`/`DbConfig`'s `from_env()`
//! builder pattern: every field has an explicit environment variable
//! and, where sensible, a default, so the binary never has to guess.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub schema_path: PathBuf,

    pub upstream_url: String,
    pub upstream_script_name: String,
    pub upstream_api_key: SecretString,

    pub watch_events: bool,
    pub watch_idle_delay: Duration,

    pub scan_changes: bool,
    pub scan_interval: Duration,
    pub scan_since: Duration,

    pub auto_last_id: bool,

    pub control_socket_path: PathBuf,
    pub bind_addr: SocketAddr,

    pub db_pool_size: usize,
}

impl AppConfig {
    /// Loads every field from the environment. `database_url`,
    /// `upstream_url`, and `upstream_script_name` are required; the
    /// remaining fields fall back to the defaults named in their
    /// `env` docs below.
    ///
    /// # Environment variables
    /// - `SGCACHE_DATABASE_URL` (required)
    /// - `SGCACHE_SCHEMA` (default `schema.yml`)
    /// - `SGCACHE_UPSTREAM_URL` (required)
    /// - `SGCACHE_UPSTREAM_SCRIPT_NAME` (required)
    /// - `SGCACHE_UPSTREAM_API_KEY` (required)
    /// - `SGCACHE_WATCH_EVENTS` (default `true`)
    /// - `SGCACHE_WATCH_IDLE_DELAY` (seconds, default `5`)
    /// - `SGCACHE_SCAN_CHANGES` (default `true`)
    /// - `SGCACHE_SCAN_INTERVAL` (seconds, default `300`)
    /// - `SGCACHE_SCAN_SINCE` (seconds, default `3600`)
    /// - `SGCACHE_AUTO_LAST_ID` (default `false`)
    /// - `SGCACHE_CONTROL_SOCKET` (default `/tmp/sgcache.sock`)
    /// - `PORT` / `SGCACHE_PORT` (default `8090`), `SGCACHE_BIND_HOST` (default `0.0.0.0`)
    /// - `SGCACHE_DB_POOL_SIZE` (default `16`)
    pub fn from_env() -> AppResult<Self> {
        let database_url = required_env("SGCACHE_DATABASE_URL")?;
        let upstream_url = required_env("SGCACHE_UPSTREAM_URL")?;
        let upstream_script_name = required_env("SGCACHE_UPSTREAM_SCRIPT_NAME")?;
        let upstream_api_key = SecretString::from(required_env("SGCACHE_UPSTREAM_API_KEY")?);

        Ok(AppConfig {
            database_url,
            schema_path: std::env::var("SGCACHE_SCHEMA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("schema.yml")),

            upstream_url,
            upstream_script_name,
            upstream_api_key,

            watch_events: bool_env("SGCACHE_WATCH_EVENTS", true),
            watch_idle_delay: Duration::from_secs(u64_env("SGCACHE_WATCH_IDLE_DELAY", 5)),

            scan_changes: bool_env("SGCACHE_SCAN_CHANGES", true),
            scan_interval: Duration::from_secs(u64_env("SGCACHE_SCAN_INTERVAL", 300)),
            scan_since: Duration::from_secs(u64_env("SGCACHE_SCAN_SINCE", 3600)),

            auto_last_id: bool_env("SGCACHE_AUTO_LAST_ID", false),

            control_socket_path: std::env::var("SGCACHE_CONTROL_SOCKET")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/sgcache.sock")),
            bind_addr: resolve_bind_addr()?,

            db_pool_size: u64_env("SGCACHE_DB_POOL_SIZE", 16) as usize,
        })
    }
}

fn required_env(key: &str) -> AppResult<String> {
    std::env::var(key).map_err(|_| AppError::MissingConfig(key.to_string()))
}

fn bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| s.to_lowercase() != "false" && s.to_lowercase() != "0")
        .unwrap_or(default)
}

fn u64_env(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Resolves the bind address the same way `caliber-api::main`'s
/// `resolve_bind_addr` does: a generic `PORT` (the convention most
/// hosting platforms set) takes priority over the service-specific
/// `SGCACHE_PORT`, which itself falls back to a fixed default.
fn resolve_bind_addr() -> AppResult<SocketAddr> {
    let host = std::env::var("SGCACHE_BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("SGCACHE_PORT").ok())
        .unwrap_or_else(|| "8090".to_string());
    let port: u16 = port_str
        .parse()
        .map_err(|_| AppError::InvalidConfig(format!("invalid port value: {port_str}")))?;

    format!("{host}:{port}")
        .parse()
        .map_err(|e| AppError::InvalidConfig(format!("invalid bind address {host}:{port}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn bool_env_accepts_false_and_zero() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SGCACHE_TEST_BOOL", "false");
        assert!(!bool_env("SGCACHE_TEST_BOOL", true));
        std::env::set_var("SGCACHE_TEST_BOOL", "0");
        assert!(!bool_env("SGCACHE_TEST_BOOL", true));
        std::env::remove_var("SGCACHE_TEST_BOOL");
        assert!(bool_env("SGCACHE_TEST_BOOL", true));
    }

    #[test]
    fn required_env_reports_missing_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("SGCACHE_TEST_REQUIRED");
        let err = required_env("SGCACHE_TEST_REQUIRED").unwrap_err();
        assert!(matches!(err, AppError::MissingConfig(ref k) if k == "SGCACHE_TEST_REQUIRED"));
    }
}
