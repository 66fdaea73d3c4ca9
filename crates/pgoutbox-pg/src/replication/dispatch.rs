//! The CDC loop: receive, decode, publish, acknowledge.
//!
//! All per-session state (relation cache, stream flag, WAL position,
//! keepalive schedule) is owned by the [`Dispatcher`] and touched only from
//! the task running [`Dispatcher::run`].

use std::time::Duration;

use pgoutbox_bus::{encode_row, EventPublisher, SubjectRouting};
use pgoutbox_core::{OutboxRecord, RowMap, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn, Level};

use super::feed::{FeedMessage, ReplicationFeed, Received};
use super::keepalive::{KeepaliveTimer, WalPosition};
use super::lsn::Lsn;
use super::pgoutput::{ColumnValue, InsertMessage, PgOutputDecoder, PgOutputMessage};
use super::relation_cache::{Announcement, RelationCache};
use super::stream_state::StreamState;
use super::types::TypeDecoder;
use crate::error::{PgError, PgResult};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Time between standby status updates when the server does not ask sooner.
    pub status_interval: Duration,
    pub routing: SubjectRouting,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(10),
            routing: SubjectRouting::default(),
        }
    }
}

/// Counters kept for the lifetime of a dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub messages: u64,
    pub rows_published: u64,
    pub publish_failures: u64,
    pub status_updates: u64,
}

/// Why [`Dispatcher::run`] returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ConnectionClosed,
}

pub struct Dispatcher<P: EventPublisher> {
    decoder: PgOutputDecoder,
    relations: RelationCache,
    types: TypeDecoder,
    stream: StreamState,
    position: WalPosition,
    keepalive: KeepaliveTimer,
    publisher: P,
    routing: SubjectRouting,
    stats: DispatchStats,
}

impl<P: EventPublisher> Dispatcher<P> {
    pub fn new(publisher: P, config: DispatchConfig, start: Lsn) -> Self {
        Self {
            decoder: PgOutputDecoder::new(),
            relations: RelationCache::new(),
            types: TypeDecoder::new(),
            stream: StreamState::new(),
            position: WalPosition::new(start),
            keepalive: KeepaliveTimer::new(config.status_interval, Instant::now()),
            publisher,
            routing: config.routing,
            stats: DispatchStats::default(),
        }
    }

    /// The position the next standby status update will report.
    pub fn position(&self) -> Lsn {
        self.position.current()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn keepalive_deadline(&self) -> Instant {
        self.keepalive.deadline()
    }

    pub fn is_in_stream(&self) -> bool {
        self.stream.is_in_stream()
    }

    pub fn relations(&self) -> &RelationCache {
        &self.relations
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Drive `feed` until the connection closes or a fatal error occurs.
    pub async fn run<F: ReplicationFeed>(&mut self, feed: &mut F) -> PgResult<StopReason> {
        info!(
            lsn = %self.position.current(),
            interval_secs = self.keepalive.interval().as_secs(),
            "Dispatch loop started"
        );

        let result = self.run_until_stopped(feed).await;
        self.stream.reset();
        self.relations.clear();

        info!(
            lsn = %self.position.current(),
            messages = self.stats.messages,
            published = self.stats.rows_published,
            publish_failures = self.stats.publish_failures,
            status_updates = self.stats.status_updates,
            "Dispatch loop stopped"
        );
        result
    }

    async fn run_until_stopped<F: ReplicationFeed>(&mut self, feed: &mut F) -> PgResult<StopReason> {
        loop {
            if self.keepalive.is_due(Instant::now()) {
                let lsn = self.position.current();
                feed.send_standby_status(lsn).await?;
                self.stats.status_updates += 1;
                self.keepalive.rearm(Instant::now());
            }

            match feed.receive(self.keepalive.deadline()).await? {
                Received::Timeout => continue,
                Received::Closed => {
                    if let Err(e) = self.publisher.flush().await {
                        warn!(error = %e, "Failed to flush publisher on shutdown");
                    }
                    return Ok(StopReason::ConnectionClosed);
                }
                Received::Message(message) => {
                    self.stats.messages += 1;
                    self.handle_message(message).await?;
                }
            }
        }
    }

    /// Apply one feed message. Errors returned here are fatal.
    pub async fn handle_message(&mut self, message: FeedMessage) -> PgResult<()> {
        match message {
            FeedMessage::KeepAlive(keepalive) => {
                self.position.observe(keepalive.server_wal_end);
                if keepalive.reply_requested {
                    debug!(lsn = %keepalive.server_wal_end, "Server requested a status update");
                    self.keepalive.collapse(Instant::now());
                }
                Ok(())
            }
            FeedMessage::XLogData(xlog) => {
                self.handle_wal_data(&xlog.data).await?;
                self.position.observe(xlog.wal_start);
                Ok(())
            }
            FeedMessage::ServerError(e) => Err(PgError::Server(e.to_string())),
            FeedMessage::Other(tag) => {
                warn!(tag = %(tag as char), "Ignoring unknown replication message");
                Ok(())
            }
        }
    }

    /// Decode one pgoutput message and act on it.
    pub async fn handle_wal_data(&mut self, data: &[u8]) -> PgResult<()> {
        let message = self.decoder.decode(data, self.stream.is_in_stream())?;

        match message {
            PgOutputMessage::Relation(relation) => {
                let relation_id = relation.relation_id;
                let table = format!("{}.{}", relation.namespace, relation.name);
                let columns = relation.columns.len();
                match self.relations.announce(relation) {
                    Announcement::Changed => {
                        info!(relation_id, table = %table, columns, "Relation layout changed")
                    }
                    _ => debug!(relation_id, table = %table, columns, "Cached relation"),
                }
            }
            PgOutputMessage::Insert(insert) => self.handle_insert(insert).await?,
            PgOutputMessage::StreamStart(start) => {
                debug!(xid = start.xid, first_segment = start.first_segment, "Stream start");
                self.stream.start(start.xid);
            }
            PgOutputMessage::StreamStop => {
                debug!(xid = ?self.stream.xid(), "Stream stop");
                self.stream.stop();
            }
            PgOutputMessage::StreamAbort(abort) => {
                warn!(
                    xid = abort.xid,
                    subxid = abort.subxid,
                    "Streamed transaction aborted; rows already published from it stay published"
                );
            }
            PgOutputMessage::Type(t) => {
                debug!(type_id = t.type_id, name = %t.name, "Type announced");
            }
            other => debug!(kind = other.kind(), "Ignoring message"),
        }

        Ok(())
    }

    async fn handle_insert(&mut self, insert: InsertMessage) -> PgResult<()> {
        let (table, row) = {
            let relation = self.relations.resolve(insert.relation_id)?;
            relation.check_tuple_width(insert.tuple.columns.len())?;

            let mut row = RowMap::with_capacity(relation.columns.len());
            for (column, value) in relation.columns.iter().zip(&insert.tuple.columns) {
                match value {
                    ColumnValue::Null => {
                        row.insert(column.name.clone(), Value::Null);
                    }
                    ColumnValue::Text(raw) => {
                        let decoded = self.types.decode(raw, column.type_oid)?;
                        row.insert(column.name.clone(), decoded);
                    }
                    // Unchanged TOAST and binary values are not part of an insert
                    // in text mode.
                    ColumnValue::Unchanged | ColumnValue::Binary(_) => {}
                }
            }
            (relation.qualified_name(), row)
        };

        let subject = self.routing.subject_for(&row);
        let result = match encode_row(&row) {
            Ok(payload) => self.publisher.publish(&subject, payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.stats.rows_published += 1;
                if tracing::enabled!(Level::DEBUG) {
                    match OutboxRecord::from_row(&row) {
                        Ok(record) => debug!(
                            subject = %subject,
                            table = %table,
                            event_name = %record.event_name,
                            object_id = %record.object_id,
                            "Published outbox event"
                        ),
                        Err(reason) => debug!(
                            subject = %subject,
                            table = %table,
                            reason = %reason,
                            "Published row without outbox columns"
                        ),
                    }
                }
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                warn!(subject = %subject, table = %table, error = %e, "Failed to publish row");
            }
        }

        Ok(())
    }
}
