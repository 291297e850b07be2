//! The router's upstream surface: forwarding an arbitrary JSON-RPC call
//! verbatim (passthrough, and the forward-first half of create/update/
//! delete/revive) and running a batch of such calls in one round trip.
//!
//! Distinct from `sgcache_sync::UpstreamClient`, which only knows the
//! three narrow calls the follower and scanner need. The router has to
//! forward *any* method name byte-for-byte, including ones it does not
//! recognise at all.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{RouterError, RouterResult};

#[async_trait]
pub trait UpstreamForwarder: Send + Sync {
    async fn forward(&self, method: &str, params: JsonValue) -> RouterResult<JsonValue>;

    /// Runs `calls` as one upstream batch request, returning one result
    /// per call in the same order. Grounded on `web/api3.py`'s
    /// `batch` handler, which packs every item's forwarded method/
    /// params pair into a single `batch` upstream call rather than
    /// issuing N round trips.
    async fn forward_batch(&self, calls: Vec<(String, JsonValue)>) -> RouterResult<Vec<JsonValue>>;
}

pub struct HttpUpstreamForwarder {
    base_url: String,
    http: reqwest::Client,
}

impl HttpUpstreamForwarder {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpUpstreamForwarder {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: JsonValue) -> RouterResult<JsonValue> {
        let body = serde_json::json!({"method_name": method, "params": params});
        let response = self
            .http
            .post(format!("{}/api3/json", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RouterError::Upstream(e.to_string()))?
            .json::<JsonValue>()
            .await
            .map_err(|e| RouterError::Upstream(e.to_string()))?;

        if response.get("exception").and_then(|v| v.as_bool()).unwrap_or(false) {
            let message = response
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown upstream error")
                .to_string();
            return Err(RouterError::Upstream(message));
        }
        Ok(response.get("results").cloned().unwrap_or(response))
    }
}

#[async_trait]
impl UpstreamForwarder for HttpUpstreamForwarder {
    async fn forward(&self, method: &str, params: JsonValue) -> RouterResult<JsonValue> {
        self.call(method, params).await
    }

    async fn forward_batch(&self, calls: Vec<(String, JsonValue)>) -> RouterResult<Vec<JsonValue>> {
        let requests: Vec<JsonValue> = calls
            .into_iter()
            .map(|(method, params)| serde_json::json!({"request_type": method, "params": params}))
            .collect();
        let response = self.call("batch", serde_json::json!({"requests": requests})).await?;
        Ok(response
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}
