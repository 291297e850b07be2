//! Freshness subsystem: the event-log follower and the periodic
//! scanner, both writing through `sgcache_store::write` into the same
//! relational store the request router reads from.

pub mod error;
pub mod follower;
pub mod scanner;
pub mod upstream;
pub mod watermark;

pub use error::{SyncError, SyncResult};
pub use follower::EventFollower;
pub use scanner::{ScanScope, Scanner};
pub use upstream::{EventLogEntry, HttpUpstreamClient, SearchRequest, UpstreamClient};
pub use watermark::{auto_last_id, ScanCursor, Watermark};
