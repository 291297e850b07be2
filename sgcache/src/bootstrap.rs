//! Process bootstrap: loading the schema file, building the
//! connection pool, and wiring the follower/scanner/control-plane
//! tasks around one shared `Arc<Schema>`.

use std::collections::HashMap;
use std::sync::Arc;

use deadpool_postgres::Pool;
use sgcache_control::{ControlServer, ControlState};
use sgcache_schema::Schema;
use sgcache_sync::{EventFollower, HttpUpstreamClient, ScanScope, Scanner};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

pub fn load_schema(config: &AppConfig) -> AppResult<Schema> {
    let raw = std::fs::read_to_string(&config.schema_path)?;
    let value: serde_json::Value =
        serde_yaml::from_str(&raw).map_err(|source| AppError::SchemaFile {
            path: config.schema_path.clone(),
            source,
        })?;
    Ok(Schema::parse(&value)?)
}

pub fn create_pool(config: &AppConfig) -> AppResult<Pool> {
    Ok(sgcache_store::create_pool_from_url(
        &config.database_url,
        config.db_pool_size,
    )?)
}

/// The long-running pieces spun up by `run`, kept here so `main` and
/// the integration tests can hold onto handles and control state
/// without duplicating the wiring.
pub struct Subsystems {
    pub follower_state: Arc<ControlState>,
    pub scanner_state: Arc<ControlState>,
    pub follower_handle: Option<tokio::task::JoinHandle<()>>,
    pub scanner_handle: Option<tokio::task::JoinHandle<()>>,
    pub control_handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

/// Spawns the follower, the scanner, and the control-plane server as
/// tasks sharing one schema/pool, per §5's concurrency model: each is
/// a long-lived `tokio::spawn`ed task with its own cooperative-stop
/// flag, wired to the same `Arc<Schema>`/`Pool` the router uses.
pub async fn spawn_subsystems(config: &AppConfig, schema: Arc<Schema>, pool: Pool) -> AppResult<Subsystems> {
    let follower_state = ControlState::new();
    let scanner_state = ControlState::new();

    let follower_handle = if config.watch_events {
        let upstream = Arc::new(HttpUpstreamClient::new(
            config.upstream_url.clone(),
            config.upstream_script_name.clone(),
            config.upstream_api_key.clone(),
        ));
        let follower = EventFollower::new(schema.clone(), pool.clone(), upstream, config.watch_idle_delay);
        let initial_watermark = if config.auto_last_id {
            sgcache_sync::auto_last_id(&schema, &pool).await?
        } else {
            sgcache_sync::Watermark::zero()
        };
        let state = follower_state.clone();
        Some(tokio::spawn(async move {
            info!("event follower starting");
            // The loop itself never exits on its own — `stop`/`start`
            // only gate `state.sleep()`'s parking between iterations;
            // process-level shutdown is `JoinHandle::abort()` in `main`.
            let mut should_continue = || true;
            let sleeper_state = state.clone();
            let _ = follower
                .run(initial_watermark, &mut should_continue, move |d| {
                    let state = sleeper_state.clone();
                    Box::pin(async move { state.sleep(d).await })
                })
                .await;
        }))
    } else {
        None
    };

    let scanner_handle = if config.scan_changes {
        let upstream = Arc::new(HttpUpstreamClient::new(
            config.upstream_url.clone(),
            config.upstream_script_name.clone(),
            config.upstream_api_key.clone(),
        ));
        let scanner = Scanner::new(schema.clone(), pool.clone(), upstream, ScanScope::default());
        let state = scanner_state.clone();
        let interval = config.scan_interval;
        Some(tokio::spawn(async move {
            info!("scanner starting");
            // Same shutdown split as the follower above: `stop`/`start`
            // gate `state.sleep()`, `abort()` gates the task itself.
            let mut should_continue = || true;
            let sleeper_state = state.clone();
            let _ = scanner
                .run(None, interval, &mut should_continue, move |d| {
                    let state = sleeper_state.clone();
                    Box::pin(async move { state.sleep(d).await })
                })
                .await;
        }))
    } else {
        None
    };

    let mut subsystems: HashMap<String, Arc<ControlState>> = HashMap::new();
    subsystems.insert("follower".to_string(), follower_state.clone());
    subsystems.insert("scanner".to_string(), scanner_state.clone());
    let control_server = Arc::new(ControlServer::new(subsystems));
    let socket_path = config.control_socket_path.clone();
    let control_handle = tokio::spawn(async move { control_server.serve(socket_path).await });

    Ok(Subsystems {
        follower_state,
        scanner_state,
        follower_handle,
        scanner_handle,
        control_handle,
    })
}
