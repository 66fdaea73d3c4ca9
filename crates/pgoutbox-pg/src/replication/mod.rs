//! Push-based CDC over PostgreSQL's streaming replication protocol with
//! the pgoutput plugin.

pub mod dispatch;
pub mod feed;
pub mod keepalive;
pub mod lsn;
pub mod pgoutput;
pub mod protocol;
pub mod publication;
pub mod relation_cache;
pub mod session;
pub mod slot;
pub mod stream_state;
pub mod types;

pub use dispatch::{DispatchConfig, DispatchStats, Dispatcher, StopReason};
pub use feed::{FeedMessage, ReplicationFeed, Received};
pub use keepalive::{KeepaliveTimer, WalPosition, MIN_STATUS_INTERVAL};
pub use lsn::Lsn;
pub use pgoutput::{PgOutputDecoder, PgOutputMessage};
pub use protocol::{PrimaryKeepalive, ServerError, XLogData};
pub use publication::{ensure_insert_publication, quote_ident, quote_table_name};
pub use relation_cache::RelationCache;
pub use session::{
    FeedHandle, FeedSpec, ReplicationSession, SessionCloser, SessionConfig, SslMode,
    StreamOptions, SystemIdentity,
};
pub use slot::ensure_slot_available;
pub use stream_state::StreamState;
pub use types::{Codec, TypeDecoder};
