//! Wire-level framing for the PostgreSQL frontend/backend protocol as used
//! by a walsender connection.
//!
//! Frames are parsed out of a growable buffer instead of with `read_exact`,
//! so a read that is abandoned at a deadline never loses a partial frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::fmt;

use super::feed::FeedMessage;
use super::lsn::Lsn;
use crate::error::{PgError, PgResult};

/// Seconds between the Unix epoch and the PostgreSQL epoch (2000-01-01).
pub const PG_EPOCH_OFFSET_SECS: i64 = 946_684_800;

/// SQLSTATE for `duplicate_object`.
pub const DUPLICATE_OBJECT: &str = "42710";

const PROTOCOL_VERSION_3: i32 = 196_608;
const SSL_REQUEST_CODE: i32 = 80_877_103;

/// Upper bound on a single backend frame.
const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// One backend message: tag byte plus body (length prefix stripped).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub tag: u8,
    pub body: Bytes,
}

/// Split the next complete frame off `buf`, if one is buffered.
pub fn parse_frame(buf: &mut BytesMut) -> PgResult<Option<Frame>> {
    if buf.len() < 5 {
        return Ok(None);
    }

    let tag = buf[0];
    let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if len < 4 {
        return Err(PgError::Protocol(format!(
            "invalid length {} for '{}' message",
            len, tag as char
        )));
    }
    let len = len as usize;
    if len > MAX_FRAME_LEN {
        return Err(PgError::Protocol(format!(
            "'{}' message of {} bytes exceeds frame limit",
            tag as char, len
        )));
    }
    if buf.len() < 1 + len {
        buf.reserve(1 + len - buf.len());
        return Ok(None);
    }

    let mut frame = buf.split_to(1 + len);
    frame.advance(5);
    Ok(Some(Frame {
        tag,
        body: frame.freeze(),
    }))
}

/// Encode a tagged frontend message.
pub fn encode_message(tag: u8, body: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(body.len() + 5);
    buf.put_u8(tag);
    buf.put_i32(body.len() as i32 + 4);
    buf.extend_from_slice(body);
    buf
}

pub fn encode_ssl_request() -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_i32(8);
    buf.put_i32(SSL_REQUEST_CODE);
    buf
}

/// Startup message (untagged) carrying the given parameters.
pub fn encode_startup(params: &[(&str, &str)]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_i32(0);
    buf.put_i32(PROTOCOL_VERSION_3);
    for (key, value) in params {
        put_cstr(&mut buf, key);
        put_cstr(&mut buf, value);
    }
    buf.put_u8(0);

    let len = buf.len() as i32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    buf
}

pub fn encode_query(sql: &str) -> BytesMut {
    let mut body = BytesMut::with_capacity(sql.len() + 1);
    put_cstr(&mut body, sql);
    encode_message(b'Q', &body)
}

pub fn encode_copy_data(payload: &[u8]) -> BytesMut {
    encode_message(b'd', payload)
}

pub fn encode_copy_done() -> BytesMut {
    encode_message(b'c', &[])
}

pub fn encode_terminate() -> BytesMut {
    encode_message(b'X', &[])
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Primary keepalive (`'k'`) sent by the walsender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryKeepalive {
    pub server_wal_end: Lsn,
    /// Microseconds since 2000-01-01.
    pub server_time: i64,
    pub reply_requested: bool,
}

/// A chunk of WAL (`'w'`) carrying one pgoutput message.
#[derive(Debug, Clone, PartialEq)]
pub struct XLogData {
    pub wal_start: Lsn,
    pub wal_end: Lsn,
    pub server_time: i64,
    pub data: Bytes,
}

/// Parse a CopyData body received while streaming.
pub fn parse_copy_data(mut body: Bytes) -> PgResult<FeedMessage> {
    if body.is_empty() {
        return Err(PgError::Protocol("empty CopyData message".into()));
    }

    match body.get_u8() {
        b'k' => {
            if body.remaining() < 17 {
                return Err(PgError::Protocol(format!(
                    "keepalive too short: {} bytes",
                    body.remaining()
                )));
            }
            Ok(FeedMessage::KeepAlive(PrimaryKeepalive {
                server_wal_end: Lsn(body.get_u64()),
                server_time: body.get_i64(),
                reply_requested: body.get_u8() != 0,
            }))
        }
        b'w' => {
            if body.remaining() < 24 {
                return Err(PgError::Protocol(format!(
                    "XLogData header too short: {} bytes",
                    body.remaining()
                )));
            }
            let wal_start = Lsn(body.get_u64());
            let wal_end = Lsn(body.get_u64());
            let server_time = body.get_i64();
            Ok(FeedMessage::XLogData(XLogData {
                wal_start,
                wal_end,
                server_time,
                data: body,
            }))
        }
        other => Ok(FeedMessage::Other(other)),
    }
}

/// Microseconds since the PostgreSQL epoch.
pub fn pg_epoch_micros(now: DateTime<Utc>) -> i64 {
    now.timestamp_micros() - PG_EPOCH_OFFSET_SECS * 1_000_000
}

/// Standby status update (`'r'`) reporting `lsn` as written, flushed and applied.
///
/// Returns the CopyData payload; wrap it with [`encode_copy_data`].
pub fn encode_standby_status(lsn: Lsn, now: DateTime<Utc>, reply_requested: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(34);
    buf.put_u8(b'r');
    buf.put_u64(lsn.as_u64());
    buf.put_u64(lsn.as_u64());
    buf.put_u64(lsn.as_u64());
    buf.put_i64(pg_epoch_micros(now));
    buf.put_u8(reply_requested as u8);
    buf.freeze()
}

/// An ErrorResponse or NoticeResponse from the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerError {
    pub severity: String,
    pub code: String,
    pub message: String,
}

impl ServerError {
    pub fn is_duplicate_object(&self) -> bool {
        self.code == DUPLICATE_OBJECT
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (SQLSTATE {})", self.severity, self.message, self.code)
    }
}

pub fn parse_error_response(body: &[u8]) -> ServerError {
    let mut err = ServerError::default();
    let mut rest = body;

    while let Some((&field, tail)) = rest.split_first() {
        if field == 0 {
            break;
        }
        let Some(end) = tail.iter().position(|&b| b == 0) else {
            break;
        };
        let value = String::from_utf8_lossy(&tail[..end]).into_owned();
        match field {
            b'S' if err.severity.is_empty() => err.severity = value,
            b'V' => err.severity = value,
            b'C' => err.code = value,
            b'M' => err.message = value,
            _ => {}
        }
        rest = &tail[end + 1..];
    }

    if err.message.is_empty() {
        err.message = "unknown server error".to_string();
    }
    err
}

/// Column values of a DataRow; `None` is SQL NULL.
pub fn parse_data_row(mut body: Bytes) -> PgResult<Vec<Option<String>>> {
    if body.remaining() < 2 {
        return Err(PgError::Protocol("DataRow too short".into()));
    }
    let count = body.get_i16();
    let mut values = Vec::with_capacity(count.max(0) as usize);

    for _ in 0..count {
        if body.remaining() < 4 {
            return Err(PgError::Protocol("DataRow truncated".into()));
        }
        let len = body.get_i32();
        if len < 0 {
            values.push(None);
            continue;
        }
        let len = len as usize;
        if body.remaining() < len {
            return Err(PgError::Protocol("DataRow value truncated".into()));
        }
        let raw = body.split_to(len);
        values.push(Some(String::from_utf8_lossy(&raw).into_owned()));
    }

    Ok(values)
}

/// Split an Authentication message into its request code and payload.
pub fn parse_auth_request(mut body: Bytes) -> PgResult<(i32, Bytes)> {
    if body.remaining() < 4 {
        return Err(PgError::Protocol("authentication request too short".into()));
    }
    let code = body.get_i32();
    Ok((code, body))
}
