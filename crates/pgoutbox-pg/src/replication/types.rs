//! Text-format value decoding keyed by column type OID.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use pgoutbox_core::Value;

use crate::error::{PgError, PgResult};

/// Significant digits an f64 carries without loss.
const F64_EXACT_DIGITS: usize = 15;

/// How to turn the text form of a value into a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    Bool,
    Int,
    Float,
    Numeric,
    Text,
    Json,
    Uuid,
    Date,
    Timestamp,
    TimestampTz,
    /// Hex-format bytea, re-encoded as base64.
    Bytea,
    Array(Box<Codec>),
}

impl Codec {
    fn decode(&self, text: &str) -> Result<Value, String> {
        match self {
            Codec::Bool => match text {
                "t" | "true" => Ok(Value::Bool(true)),
                "f" | "false" => Ok(Value::Bool(false)),
                _ => Err("not a boolean".to_string()),
            },
            Codec::Int => text.parse::<i64>().map(Value::Int).map_err(|e| e.to_string()),
            Codec::Float => match text {
                "NaN" | "Infinity" | "-Infinity" => Ok(Value::String(text.to_string())),
                _ => text.parse::<f64>().map(Value::Float).map_err(|e| e.to_string()),
            },
            Codec::Numeric => decode_numeric(text),
            Codec::Text => Ok(Value::String(text.to_string())),
            Codec::Json => serde_json::from_str(text)
                .map(Value::Json)
                .map_err(|e| e.to_string()),
            Codec::Uuid => uuid::Uuid::parse_str(text)
                .map(|u| Value::String(u.hyphenated().to_string()))
                .map_err(|e| e.to_string()),
            Codec::Date => decode_date(text),
            Codec::Timestamp => decode_timestamp(text),
            Codec::TimestampTz => decode_timestamptz(text),
            Codec::Bytea => {
                let hex_digits = text
                    .strip_prefix("\\x")
                    .ok_or_else(|| "bytea is not in hex format".to_string())?;
                let bytes = hex::decode(hex_digits).map_err(|e| e.to_string())?;
                Ok(Value::String(BASE64.encode(bytes)))
            }
            Codec::Array(element) => {
                let items = parse_array(text)?;
                decode_array_items(&items, element)
            }
        }
    }
}

fn decode_numeric(text: &str) -> Result<Value, String> {
    match text {
        "NaN" | "Infinity" | "-Infinity" => return Ok(Value::String(text.to_string())),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }

    let f = text.parse::<f64>().map_err(|e| e.to_string())?;
    let digits = text
        .trim_start_matches(|c| matches!(c, '-' | '+' | '0' | '.'))
        .chars()
        .filter(|c| c.is_ascii_digit())
        .count();
    if digits <= F64_EXACT_DIGITS && f.is_finite() {
        Ok(Value::Float(f))
    } else {
        // Keep full precision rather than rounding through f64.
        Ok(Value::String(text.to_string()))
    }
}

fn is_special_datetime(text: &str) -> bool {
    matches!(text, "infinity" | "-infinity") || text.ends_with(" BC")
}

fn decode_date(text: &str) -> Result<Value, String> {
    if is_special_datetime(text) {
        return Ok(Value::String(text.to_string()));
    }
    let (date, rest) = split_date(text)?;
    if !rest.is_empty() {
        return Err(format!("trailing input after date: {:?}", rest));
    }
    Ok(Value::String(format_date(date)))
}

fn decode_timestamp(text: &str) -> Result<Value, String> {
    if is_special_datetime(text) {
        return Ok(Value::String(text.to_string()));
    }
    let (date, rest) = split_date(text)?;
    let time = parse_time(strip_date_separator(rest)?)?;
    Ok(Value::String(format_datetime(date.and_time(time))))
}

fn decode_timestamptz(text: &str) -> Result<Value, String> {
    if is_special_datetime(text) {
        return Ok(Value::String(text.to_string()));
    }
    let (date, rest) = split_date(text)?;
    let rest = strip_date_separator(rest)?;
    let offset_at = rest
        .find(|c| c == '+' || c == '-')
        .ok_or_else(|| "timestamptz without UTC offset".to_string())?;
    let time = parse_time(&rest[..offset_at])?;
    let offset = parse_utc_offset(&rest[offset_at..])?;

    let utc = date
        .and_time(time)
        .checked_sub_signed(chrono::Duration::seconds(offset))
        .ok_or_else(|| "timestamp out of range".to_string())?;
    Ok(Value::String(format!("{}Z", format_datetime(utc))))
}

/// Split `YYYY-MM-DD` off the front. Years may have more than four digits.
fn split_date(text: &str) -> Result<(NaiveDate, &str), String> {
    let year_len = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    if year_len < 4 {
        return Err(format!("invalid date: {:?}", text));
    }
    let (year, rest) = text.split_at(year_len);
    let rest = rest
        .strip_prefix('-')
        .ok_or_else(|| format!("invalid date: {:?}", text))?;
    if rest.len() < 5 || !rest.is_char_boundary(5) || rest.as_bytes()[2] != b'-' {
        return Err(format!("invalid date: {:?}", text));
    }
    let (month_day, rest) = rest.split_at(5);

    let field = |s: &str| s.parse::<u32>().map_err(|e| format!("invalid date {:?}: {}", text, e));
    let year = year
        .parse::<i32>()
        .map_err(|e| format!("invalid year {:?}: {}", text, e))?;
    let date = NaiveDate::from_ymd_opt(year, field(&month_day[..2])?, field(&month_day[3..])?)
        .ok_or_else(|| format!("date out of range: {:?}", text))?;
    Ok((date, rest))
}

fn strip_date_separator(rest: &str) -> Result<&str, String> {
    rest.strip_prefix(' ')
        .or_else(|| rest.strip_prefix('T'))
        .ok_or_else(|| format!("missing time in {:?}", rest))
}

fn parse_time(text: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f").map_err(|e| e.to_string())
}

/// `+HH`, `+HH:MM` or `+HH:MM:SS` (local mean time offsets) in seconds east of UTC.
fn parse_utc_offset(text: &str) -> Result<i64, String> {
    let (sign, body) = match text.split_at(1) {
        ("+", body) => (1, body),
        ("-", body) => (-1, body),
        _ => return Err(format!("invalid UTC offset: {:?}", text)),
    };

    let mut seconds = 0i64;
    let mut parts = 0;
    for (part, scale) in body.split(':').zip([3600i64, 60, 1]) {
        if part.len() != 2 {
            return Err(format!("invalid UTC offset: {:?}", text));
        }
        let n = part
            .parse::<i64>()
            .map_err(|_| format!("invalid UTC offset: {:?}", text))?;
        seconds += n * scale;
        parts += 1;
    }
    if parts != body.split(':').count() {
        return Err(format!("invalid UTC offset: {:?}", text));
    }
    Ok(sign * seconds)
}

fn format_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

fn format_datetime(ts: NaiveDateTime) -> String {
    format!("{}T{}", format_date(ts.date()), ts.time().format("%H:%M:%S%.f"))
}

/// One element of a parsed array literal.
#[derive(Debug, Clone, PartialEq)]
enum ArrayItem {
    Null,
    Text(String),
    Nested(Vec<ArrayItem>),
}

fn decode_array_items(items: &[ArrayItem], element: &Codec) -> Result<Value, String> {
    items
        .iter()
        .map(|item| match item {
            ArrayItem::Null => Ok(Value::Null),
            ArrayItem::Text(text) => element.decode(text),
            ArrayItem::Nested(inner) => decode_array_items(inner, element),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Parse an array literal such as `{1,"a b",NULL}` or `[0:1]={x,y}`.
fn parse_array(text: &str) -> Result<Vec<ArrayItem>, String> {
    let body = if text.starts_with('[') {
        text.split_once('=')
            .map(|(_, rest)| rest)
            .ok_or_else(|| "malformed array dimensions".to_string())?
    } else {
        text
    };

    let mut chars = body.chars().peekable();
    let items = parse_array_level(&mut chars)?;
    if chars.next().is_some() {
        return Err("trailing characters after array".to_string());
    }
    Ok(items)
}

fn parse_array_level(chars: &mut Peekable<Chars<'_>>) -> Result<Vec<ArrayItem>, String> {
    if chars.next() != Some('{') {
        return Err("array must start with '{'".to_string());
    }

    let mut items = Vec::new();
    if chars.peek() == Some(&'}') {
        chars.next();
        return Ok(items);
    }

    loop {
        let item = match chars.peek() {
            Some('{') => ArrayItem::Nested(parse_array_level(chars)?),
            Some('"') => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(c) => value.push(c),
                            None => return Err("unterminated escape".to_string()),
                        },
                        Some('"') => break,
                        Some(c) => value.push(c),
                        None => return Err("unterminated quoted element".to_string()),
                    }
                }
                ArrayItem::Text(value)
            }
            Some(_) => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' || c == '}' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                let value = value.trim();
                if value.eq_ignore_ascii_case("NULL") {
                    ArrayItem::Null
                } else {
                    ArrayItem::Text(value.to_string())
                }
            }
            None => return Err("unterminated array".to_string()),
        };
        items.push(item);

        match chars.next() {
            Some(',') => continue,
            Some('}') => return Ok(items),
            Some(c) => return Err(format!("unexpected '{}' in array", c)),
            None => return Err("unterminated array".to_string()),
        }
    }
}

/// Registry of codecs by type OID.
///
/// Unregistered OIDs (extension and user-defined types) decode to their raw
/// text. A registered codec that rejects its input is a [`PgError::Decode`].
#[derive(Debug, Clone)]
pub struct TypeDecoder {
    codecs: HashMap<u32, Codec>,
}

impl Default for TypeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeDecoder {
    /// A decoder with the built-in scalar types and their one-dimensional arrays.
    pub fn new() -> Self {
        let scalars = [
            (16, Codec::Bool),
            (17, Codec::Bytea),
            (18, Codec::Text),  // char
            (19, Codec::Text),  // name
            (20, Codec::Int),   // int8
            (21, Codec::Int),   // int2
            (23, Codec::Int),   // int4
            (25, Codec::Text),  // text
            (26, Codec::Int),   // oid
            (114, Codec::Json), // json
            (700, Codec::Float),
            (701, Codec::Float),
            (1042, Codec::Text), // bpchar
            (1043, Codec::Text), // varchar
            (1082, Codec::Date),
            (1114, Codec::Timestamp),
            (1184, Codec::TimestampTz),
            (1700, Codec::Numeric),
            (2950, Codec::Uuid),
            (3802, Codec::Json), // jsonb
        ];
        let arrays = [
            (1000, 16),
            (1001, 17),
            (1002, 18),
            (1003, 19),
            (1005, 21),
            (1007, 23),
            (1009, 25),
            (1014, 1042),
            (1015, 1043),
            (1016, 20),
            (1021, 700),
            (1022, 701),
            (1028, 26),
            (1115, 1114),
            (1182, 1082),
            (1185, 1184),
            (1231, 1700),
            (2951, 2950),
            (199, 114),
            (3807, 3802),
        ];

        let mut codecs: HashMap<u32, Codec> = scalars.into_iter().collect();
        for (array_oid, element_oid) in arrays {
            if let Some(element) = codecs.get(&element_oid).cloned() {
                codecs.insert(array_oid, Codec::Array(Box::new(element)));
            }
        }

        Self { codecs }
    }

    pub fn register(&mut self, type_oid: u32, codec: Codec) {
        self.codecs.insert(type_oid, codec);
    }

    pub fn is_known(&self, type_oid: u32) -> bool {
        self.codecs.contains_key(&type_oid)
    }

    /// Decode the text form of a value of type `type_oid`.
    pub fn decode(&self, raw: &[u8], type_oid: u32) -> PgResult<Value> {
        let Some(codec) = self.codecs.get(&type_oid) else {
            return Ok(Value::String(String::from_utf8_lossy(raw).into_owned()));
        };

        let text = std::str::from_utf8(raw).map_err(|e| PgError::Decode {
            type_oid,
            value: String::from_utf8_lossy(raw).into_owned(),
            reason: e.to_string(),
        })?;

        codec.decode(text).map_err(|reason| PgError::Decode {
            type_oid,
            value: text.to_string(),
            reason,
        })
    }
}
