//! The router's error taxonomy, aggregating the store's three-kind
//! split with the router's own passthrough reason (an unrecognised
//! method name) and upstream-transport failures.

use serde_json::Value as JsonValue;
use thiserror::Error;

/// The exact original request, forwarded verbatim upstream and its
/// response streamed back unchanged. Carried as data on the
/// passthrough arm so the binary's top-level handler does not need to
/// re-derive what to forward.
#[derive(Debug, Clone)]
pub struct OriginalRequest {
    pub method: String,
    pub params: JsonValue,
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("passthrough: method {0} is not recognised")]
    UnknownMethod(String),

    #[error("passthrough: {0}")]
    Store(#[from] sgcache_store::PassthroughReason),

    #[error("client fault: {0}")]
    ClientFault(#[from] sgcache_store::ClientFaultReason),

    #[error("store error: {0}")]
    Operational(sgcache_store::StoreError),

    #[error("upstream call failed: {0}")]
    Upstream(String),
}

pub type RouterResult<T> = Result<T, RouterError>;

impl RouterError {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, RouterError::UnknownMethod(_))
            || matches!(self, RouterError::Store(_))
            || matches!(self, RouterError::Operational(e) if e.is_passthrough())
    }

    pub fn is_client_fault(&self) -> bool {
        matches!(self, RouterError::ClientFault(_))
            || matches!(self, RouterError::Operational(e) if e.is_client_fault())
    }

    /// The structured `{exception: true, error_code, message}` body the
    /// upstream dialect expects for a client-fault response, returned
    /// at HTTP 200 per §7.
    pub fn to_client_fault_body(&self) -> JsonValue {
        serde_json::json!({
            "exception": true,
            "error_code": 100,
            "message": self.to_string(),
        })
    }
}

impl From<sgcache_store::StoreError> for RouterError {
    fn from(err: sgcache_store::StoreError) -> Self {
        match err {
            sgcache_store::StoreError::Passthrough(p) => RouterError::Store(p),
            sgcache_store::StoreError::ClientFault(c) => RouterError::ClientFault(c),
            other => RouterError::Operational(other),
        }
    }
}
