//! The relational cache store: schema materialisation, the read-query
//! compiler, and the write engine, built directly against
//! `tokio-postgres`/`deadpool-postgres` rather than through an ORM,
//! since the schema itself is user-defined at startup and the cached
//! tables are queried with hand-built SQL shaped by that schema.

pub mod ddl;
pub mod error;
pub mod fields;
pub mod pool;
pub mod query;
pub mod value;
pub mod write;

pub use error::{ClientFaultReason, PassthroughReason, StoreError, StoreResult, UpsertOrigin};
pub use pool::{create_pool_from_url, StoreConfig};
pub use value::{FieldValue, MultiEntityDelta, Reference};
