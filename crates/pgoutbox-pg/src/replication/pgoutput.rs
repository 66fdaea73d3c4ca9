//! Decoder for the pgoutput logical replication protocol (version 2).
//!
//! Version 2 adds streamed in-progress transactions: between Stream Start
//! and Stream Stop, data messages carry the streaming transaction's XID
//! right after the message tag. Update, delete, truncate and the other
//! kinds this relay does not act on are surfaced as [`PgOutputMessage::Other`].
//!
//! Reference: https://www.postgresql.org/docs/current/protocol-logicalrep-message-formats.html

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read};

use crate::error::{PgError, PgResult};

/// A decoded pgoutput message.
#[derive(Debug, Clone, PartialEq)]
pub enum PgOutputMessage {
    Begin(BeginMessage),
    Commit(CommitMessage),
    Relation(RelationMessage),
    Type(TypeMessage),
    Insert(InsertMessage),
    StreamStart(StreamStartMessage),
    StreamStop,
    StreamCommit(StreamCommitMessage),
    StreamAbort(StreamAbortMessage),
    /// A message kind this relay accepts and ignores.
    Other(u8),
}

impl PgOutputMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            PgOutputMessage::Begin(_) => "begin",
            PgOutputMessage::Commit(_) => "commit",
            PgOutputMessage::Relation(_) => "relation",
            PgOutputMessage::Type(_) => "type",
            PgOutputMessage::Insert(_) => "insert",
            PgOutputMessage::StreamStart(_) => "stream_start",
            PgOutputMessage::StreamStop => "stream_stop",
            PgOutputMessage::StreamCommit(_) => "stream_commit",
            PgOutputMessage::StreamAbort(_) => "stream_abort",
            PgOutputMessage::Other(_) => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeginMessage {
    pub final_lsn: u64,
    pub timestamp: i64, // microseconds since 2000-01-01
    pub xid: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitMessage {
    pub flags: u8,
    pub commit_lsn: u64,
    pub end_lsn: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationMessage {
    /// Set when the announcement arrived inside a streamed transaction.
    pub xid: Option<u32>,
    pub relation_id: u32,
    pub namespace: String,
    pub name: String,
    pub replica_identity: ReplicaIdentity,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaIdentity {
    Default, // 'd' - default (primary key or unique index)
    Nothing, // 'n' - nothing
    Full,    // 'f' - full (all columns)
    Index,   // 'i' - index
}

impl From<u8> for ReplicaIdentity {
    fn from(b: u8) -> Self {
        match b {
            b'n' => ReplicaIdentity::Nothing,
            b'f' => ReplicaIdentity::Full,
            b'i' => ReplicaIdentity::Index,
            _ => ReplicaIdentity::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub flags: u8, // 1 = part of key
    pub name: String,
    pub type_oid: u32,
    pub type_modifier: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeMessage {
    pub xid: Option<u32>,
    pub type_id: u32,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertMessage {
    pub xid: Option<u32>,
    pub relation_id: u32,
    pub tuple: TupleData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamStartMessage {
    pub xid: u32,
    pub first_segment: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamCommitMessage {
    pub xid: u32,
    pub flags: u8,
    pub commit_lsn: u64,
    pub end_lsn: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamAbortMessage {
    pub xid: u32,
    pub subxid: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleData {
    pub columns: Vec<ColumnValue>,
}

/// One column of a tuple, as framed on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Unchanged, // TOASTed value unchanged
    Text(Bytes),
    Binary(Bytes),
}

/// Decoder for pgoutput binary protocol messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgOutputDecoder;

impl PgOutputDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a pgoutput message from raw bytes.
    ///
    /// `in_stream` must reflect whether a Stream Start has been seen without
    /// a matching Stream Stop; it decides whether data messages carry an XID.
    pub fn decode(&self, data: &[u8], in_stream: bool) -> PgResult<PgOutputMessage> {
        if data.is_empty() {
            return Err(PgError::Protocol("empty pgoutput message".into()));
        }

        let msg_type = data[0];
        let mut cursor = Cursor::new(&data[1..]);

        let result = match msg_type {
            b'B' => self.decode_begin(&mut cursor),
            b'C' => self.decode_commit(&mut cursor),
            b'R' => self.decode_relation(&mut cursor, in_stream),
            b'Y' => self.decode_type(&mut cursor, in_stream),
            b'I' => self.decode_insert(&mut cursor, in_stream),
            b'S' => self.decode_stream_start(&mut cursor),
            b'E' => Ok(PgOutputMessage::StreamStop),
            b'c' => self.decode_stream_commit(&mut cursor),
            b'A' => self.decode_stream_abort(&mut cursor),
            other => Ok(PgOutputMessage::Other(other)),
        };

        result.map_err(|e| match e {
            PgError::Io(io) => PgError::Protocol(format!(
                "truncated '{}' message: {}",
                msg_type as char, io
            )),
            other => other,
        })
    }

    fn decode_begin(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<PgOutputMessage> {
        let final_lsn = cursor.read_u64::<BigEndian>()?;
        let timestamp = cursor.read_i64::<BigEndian>()?;
        let xid = cursor.read_u32::<BigEndian>()?;

        Ok(PgOutputMessage::Begin(BeginMessage {
            final_lsn,
            timestamp,
            xid,
        }))
    }

    fn decode_commit(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<PgOutputMessage> {
        let flags = cursor.read_u8()?;
        let commit_lsn = cursor.read_u64::<BigEndian>()?;
        let end_lsn = cursor.read_u64::<BigEndian>()?;
        let timestamp = cursor.read_i64::<BigEndian>()?;

        Ok(PgOutputMessage::Commit(CommitMessage {
            flags,
            commit_lsn,
            end_lsn,
            timestamp,
        }))
    }

    fn decode_relation(
        &self,
        cursor: &mut Cursor<&[u8]>,
        in_stream: bool,
    ) -> PgResult<PgOutputMessage> {
        let xid = self.read_stream_xid(cursor, in_stream)?;
        let relation_id = cursor.read_u32::<BigEndian>()?;
        let namespace = self.read_string(cursor)?;
        let name = self.read_string(cursor)?;
        let replica_identity = cursor.read_u8()?.into();
        let num_columns = cursor.read_i16::<BigEndian>()?;
        if num_columns < 0 {
            return Err(PgError::Protocol(format!(
                "negative column count {} for relation {}",
                num_columns, relation_id
            )));
        }

        let mut columns = Vec::with_capacity(num_columns as usize);
        for _ in 0..num_columns {
            let flags = cursor.read_u8()?;
            let col_name = self.read_string(cursor)?;
            let type_oid = cursor.read_u32::<BigEndian>()?;
            let type_modifier = cursor.read_i32::<BigEndian>()?;

            columns.push(ColumnInfo {
                flags,
                name: col_name,
                type_oid,
                type_modifier,
            });
        }

        Ok(PgOutputMessage::Relation(RelationMessage {
            xid,
            relation_id,
            namespace,
            name,
            replica_identity,
            columns,
        }))
    }

    fn decode_type(&self, cursor: &mut Cursor<&[u8]>, in_stream: bool) -> PgResult<PgOutputMessage> {
        let xid = self.read_stream_xid(cursor, in_stream)?;
        let type_id = cursor.read_u32::<BigEndian>()?;
        let namespace = self.read_string(cursor)?;
        let name = self.read_string(cursor)?;

        Ok(PgOutputMessage::Type(TypeMessage {
            xid,
            type_id,
            namespace,
            name,
        }))
    }

    fn decode_insert(
        &self,
        cursor: &mut Cursor<&[u8]>,
        in_stream: bool,
    ) -> PgResult<PgOutputMessage> {
        let xid = self.read_stream_xid(cursor, in_stream)?;
        let relation_id = cursor.read_u32::<BigEndian>()?;
        let tuple_type = cursor.read_u8()?;

        if tuple_type != b'N' {
            return Err(PgError::Protocol(format!(
                "expected 'N' for new tuple, got '{}'",
                tuple_type as char
            )));
        }

        let tuple = self.decode_tuple(cursor)?;

        Ok(PgOutputMessage::Insert(InsertMessage {
            xid,
            relation_id,
            tuple,
        }))
    }

    fn decode_stream_start(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<PgOutputMessage> {
        let xid = cursor.read_u32::<BigEndian>()?;
        let first_segment = cursor.read_u8()? == 1;

        Ok(PgOutputMessage::StreamStart(StreamStartMessage { xid, first_segment }))
    }

    fn decode_stream_commit(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<PgOutputMessage> {
        let xid = cursor.read_u32::<BigEndian>()?;
        let flags = cursor.read_u8()?;
        let commit_lsn = cursor.read_u64::<BigEndian>()?;
        let end_lsn = cursor.read_u64::<BigEndian>()?;
        let timestamp = cursor.read_i64::<BigEndian>()?;

        Ok(PgOutputMessage::StreamCommit(StreamCommitMessage {
            xid,
            flags,
            commit_lsn,
            end_lsn,
            timestamp,
        }))
    }

    fn decode_stream_abort(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<PgOutputMessage> {
        // Protocol 4 appends abort LSN and timestamp; they are not needed here.
        let xid = cursor.read_u32::<BigEndian>()?;
        let subxid = cursor.read_u32::<BigEndian>()?;

        Ok(PgOutputMessage::StreamAbort(StreamAbortMessage { xid, subxid }))
    }

    fn decode_tuple(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<TupleData> {
        let num_columns = cursor.read_i16::<BigEndian>()?;
        if num_columns < 0 {
            return Err(PgError::Protocol(format!(
                "negative tuple column count {}",
                num_columns
            )));
        }
        let mut columns = Vec::with_capacity(num_columns as usize);

        for _ in 0..num_columns {
            let col_type = cursor.read_u8()?;
            let value = match col_type {
                b'n' => ColumnValue::Null,
                b'u' => ColumnValue::Unchanged,
                b't' => ColumnValue::Text(self.read_counted_bytes(cursor)?),
                b'b' => ColumnValue::Binary(self.read_counted_bytes(cursor)?),
                other => {
                    return Err(PgError::Protocol(format!(
                        "unknown column value type: '{}' (0x{:02X})",
                        other as char, other
                    )));
                }
            };
            columns.push(value);
        }

        Ok(TupleData { columns })
    }

    fn read_stream_xid(&self, cursor: &mut Cursor<&[u8]>, in_stream: bool) -> PgResult<Option<u32>> {
        if in_stream {
            Ok(Some(cursor.read_u32::<BigEndian>()?))
        } else {
            Ok(None)
        }
    }

    fn read_counted_bytes(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<Bytes> {
        let len = cursor.read_i32::<BigEndian>()?;
        if len < 0 {
            return Err(PgError::Protocol(format!("negative column length {}", len)));
        }
        let mut buf = vec![0u8; len as usize];
        cursor.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Read a null-terminated string.
    fn read_string(&self, cursor: &mut Cursor<&[u8]>) -> PgResult<String> {
        let mut bytes = Vec::new();
        loop {
            let b = cursor.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
