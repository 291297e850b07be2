//! The request router: the single entry point that decides, for each
//! incoming JSON-RPC call, whether to answer it from the local cache or
//! forward it upstream unchanged.
//!
//! Grounded on `original_source/sgcache/web/api3.py`, which recognises a
//! closed set of method names and falls back to forwarding anything it
//! does not recognise — the same passthrough-by-default posture this
//! crate's [`RouterError`] models as a dedicated error arm rather than a
//! generic failure.

pub mod batch;
pub mod error;
pub mod read;
pub mod upstream;
pub mod write;

use std::sync::Arc;

use deadpool_postgres::Pool;
use serde_json::Value as JsonValue;
use sgcache_schema::Schema;

pub use batch::{BatchRequestItem, ForwardRequest};
pub use error::{OriginalRequest, RouterError, RouterResult};
pub use upstream::{HttpUpstreamForwarder, UpstreamForwarder};

/// A constant descriptor answered for `info`, carrying the `sgcache`
/// marker the original client library checks for to detect that it is
/// talking to the cache rather than the upstream directly.
pub fn info_response() -> JsonValue {
    serde_json::json!({
        "sgcache": true,
        "version": env!("CARGO_PKG_VERSION"),
        "s3_uploads_enabled": false,
    })
}

pub struct Router {
    schema: Arc<Schema>,
    pool: Pool,
    upstream: Arc<dyn UpstreamForwarder>,
}

impl Router {
    pub fn new(schema: Arc<Schema>, pool: Pool, upstream: Arc<dyn UpstreamForwarder>) -> Self {
        Router { schema, pool, upstream }
    }

    /// Dispatches one JSON-RPC call. Anything other than the closed set
    /// of recognised method names comes back as
    /// `RouterError::UnknownMethod`, which the caller (the binary's HTTP
    /// layer) is expected to treat as a passthrough signal and forward
    /// verbatim, exactly like every other passthrough reason.
    pub async fn dispatch(&self, method: &str, params: JsonValue) -> RouterResult<JsonValue> {
        match method {
            "info" => Ok(info_response()),
            "read" => {
                let client = self.pool.get().await.map_err(sgcache_store::StoreError::from)?;
                read::handle_read(&self.schema, &client, &params).await
            }
            "create" => {
                let mut client = self.pool.get().await.map_err(sgcache_store::StoreError::from)?;
                write::handle_create(&self.schema, &mut client, self.upstream.as_ref(), &params).await
            }
            "update" => {
                let mut client = self.pool.get().await.map_err(sgcache_store::StoreError::from)?;
                write::handle_update(&self.schema, &mut client, self.upstream.as_ref(), &params).await
            }
            "delete" => {
                let client = self.pool.get().await.map_err(sgcache_store::StoreError::from)?;
                write::handle_retire_or_revive(&self.schema, &client, self.upstream.as_ref(), "delete", &params).await
            }
            "revive" => {
                let client = self.pool.get().await.map_err(sgcache_store::StoreError::from)?;
                write::handle_retire_or_revive(&self.schema, &client, self.upstream.as_ref(), "revive", &params).await
            }
            "batch" => {
                let mut client = self.pool.get().await.map_err(sgcache_store::StoreError::from)?;
                let requests = parse_batch_requests(&params)?;
                let results = batch::handle_batch(&self.schema, &mut client, self.upstream.as_ref(), &requests).await?;
                Ok(serde_json::json!({"results": results}))
            }
            other => Err(RouterError::UnknownMethod(other.to_string())),
        }
    }
}

fn parse_batch_requests(params: &JsonValue) -> RouterResult<Vec<BatchRequestItem>> {
    let requests = params
        .get("requests")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RouterError::UnknownMethod("batch".to_string()))?;

    requests
        .iter()
        .map(|r| {
            let request_type = r
                .get("request_type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RouterError::UnknownMethod("batch item".to_string()))?
                .to_string();
            let data = r.get("data").cloned().unwrap_or(JsonValue::Null);
            let entity_type = data
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(BatchRequestItem { request_type, entity_type, data })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_response_carries_sgcache_marker() {
        let info = info_response();
        assert_eq!(info.get("sgcache"), Some(&JsonValue::Bool(true)));
    }

    #[test]
    fn unknown_batch_request_type_does_not_panic() {
        let params = serde_json::json!({"requests": [{"request_type": "create", "data": {"type": "Shot"}}]});
        let parsed = parse_batch_requests(&params).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].entity_type, "Shot");
    }
}
