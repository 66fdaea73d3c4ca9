//! The seam between the dispatch loop and the replication connection.

use std::future::Future;

use tokio::time::Instant;

use super::lsn::Lsn;
use super::protocol::{PrimaryKeepalive, ServerError, XLogData};
use crate::error::PgResult;

/// A message read from a streaming replication connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    KeepAlive(PrimaryKeepalive),
    XLogData(XLogData),
    /// ErrorResponse sent by the server mid-stream.
    ServerError(ServerError),
    /// A CopyData kind this client does not know.
    Other(u8),
}

/// Outcome of one bounded receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Message(FeedMessage),
    /// The deadline passed with no complete message.
    Timeout,
    /// The connection ended, either from the server side or via a closer.
    Closed,
}

/// A source of replication messages that accepts position acknowledgments.
pub trait ReplicationFeed: Send {
    /// Wait for the next message until `deadline`.
    fn receive(&mut self, deadline: Instant) -> impl Future<Output = PgResult<Received>> + Send;

    /// Report `lsn` as written, flushed and applied.
    fn send_standby_status(&mut self, lsn: Lsn) -> impl Future<Output = PgResult<()>> + Send;
}
