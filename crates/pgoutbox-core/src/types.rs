use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Event name used for outbox rows written when a user is created.
pub const USER_CREATED: &str = "user.created";

/// Object name stored alongside user events.
pub const USER_OBJECT: &str = "user";

/// A decoded column value from a replicated row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render a scalar as text, the way it would read in a subject or log line.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Json(_) => None,
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Json(json) => json,
        }
    }
}

/// A decoded row: column name to value. Built per insert and dropped after publish.
pub type RowMap = HashMap<String, Value>;

/// A row of the `outbox` table.
///
/// The write path inserts one of these in the same transaction as the
/// business row it describes; the CDC consumer sees it as an insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub event_name: String,
    pub object_name: String,
    pub object_id: String,
    pub data: serde_json::Value,
}

impl OutboxRecord {
    pub fn new(
        event_name: impl Into<String>,
        object_name: impl Into<String>,
        object_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            object_name: object_name.into(),
            object_id: object_id.into(),
            data,
        }
    }

    /// Rebuild an outbox record from a decoded row.
    pub fn from_row(row: &RowMap) -> Result<Self> {
        let text = |column: &str| -> Result<String> {
            match row.get(column) {
                Some(value) => value.to_text().ok_or_else(|| Error::InvalidColumnType {
                    column: column.to_string(),
                    expected: "text".to_string(),
                    actual: format!("{:?}", value),
                }),
                None => Err(Error::MissingColumn(column.to_string())),
            }
        };

        Ok(Self {
            event_name: text("event_name")?,
            object_name: text("object_name")?,
            object_id: text("object_id")?,
            data: row
                .get("data")
                .cloned()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null),
        })
    }
}

/// Request body accepted by the write path for a new user.
///
/// Every field is optional and defaults to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
}
