mod connect;
mod error;
pub mod outbox;
pub mod replication;

pub use connect::connect_postgres;
pub use error::{PgError, PgResult};
pub use outbox::{ensure_schema, store_user};
pub use replication::{
    DispatchConfig, DispatchStats, Dispatcher, FeedHandle, FeedMessage, FeedSpec, Lsn,
    Received, ReplicationFeed, ReplicationSession, SessionCloser, SessionConfig, StopReason,
    StreamOptions,
};
