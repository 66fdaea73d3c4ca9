use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use pgoutbox_core::{RowMap, USER_CREATED};
use tracing::{debug, info};

use crate::error::{BusError, BusResult};

/// Trait for publishing decoded rows to a message bus.
pub trait EventPublisher: Send + Sync {
    /// Publish one payload under `subject`.
    fn publish(&self, subject: &str, payload: Bytes) -> impl Future<Output = BusResult<()>> + Send;

    /// Push any buffered messages out to the bus.
    fn flush(&self) -> impl Future<Output = BusResult<()>> + Send;
}

/// Serialize a decoded row as a JSON object keyed by column name.
pub fn encode_row(row: &RowMap) -> BusResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(row)?))
}

/// How a decoded row picks the subject it is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRouting {
    /// Every row goes to the same subject.
    Fixed(String),
    /// Use the text value of a column (e.g. `event_name`), or `fallback`
    /// when the column is missing or null.
    FromColumn { column: String, fallback: String },
}

impl Default for SubjectRouting {
    fn default() -> Self {
        SubjectRouting::Fixed(USER_CREATED.to_string())
    }
}

impl SubjectRouting {
    pub fn subject_for(&self, row: &RowMap) -> String {
        match self {
            SubjectRouting::Fixed(subject) => subject.clone(),
            SubjectRouting::FromColumn { column, fallback } => row
                .get(column)
                .and_then(|v| v.to_text())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback.clone()),
        }
    }
}

/// Publisher backed by a NATS connection.
///
/// Every publish is bounded by `publish_timeout` so an unreachable bus
/// cannot stall WAL acknowledgment.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
    publish_timeout: Duration,
}

impl NatsPublisher {
    pub async fn connect(url: &str, publish_timeout: Duration) -> BusResult<Self> {
        info!(url = %url, "Connecting to NATS");
        let client = async_nats::ConnectOptions::new()
            .name("pgoutbox")
            .connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            publish_timeout,
        })
    }

    pub fn from_client(client: async_nats::Client, publish_timeout: Duration) -> Self {
        Self {
            client,
            publish_timeout,
        }
    }
}

impl EventPublisher for NatsPublisher {
    fn publish(&self, subject: &str, payload: Bytes) -> impl Future<Output = BusResult<()>> + Send {
        let client = self.client.clone();
        let subject = subject.to_string();
        let publish_timeout = self.publish_timeout;

        async move {
            let len = payload.len();
            match tokio::time::timeout(publish_timeout, client.publish(subject.clone(), payload))
                .await
            {
                Ok(Ok(())) => {
                    debug!(subject = %subject, bytes = len, "Published message");
                    Ok(())
                }
                Ok(Err(e)) => Err(BusError::Publish {
                    subject,
                    message: e.to_string(),
                }),
                Err(_) => Err(BusError::Timeout {
                    subject,
                    millis: publish_timeout.as_millis() as u64,
                }),
            }
        }
    }

    fn flush(&self) -> impl Future<Output = BusResult<()>> + Send {
        let client = self.client.clone();
        let publish_timeout = self.publish_timeout;

        async move {
            match tokio::time::timeout(publish_timeout, client.flush()).await {
                Ok(result) => result.map_err(|e| BusError::Flush(e.to_string())),
                Err(_) => Err(BusError::Flush("timed out".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgoutbox_core::Value;

    #[test]
    fn test_encode_row_uses_column_names() {
        let row: RowMap = [
            ("name".to_string(), Value::String("Ann".into())),
            ("email".to_string(), Value::String("ann@x.com".into())),
        ]
        .into_iter()
        .collect();

        let bytes = encode_row(&row).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Ann", "email": "ann@x.com"})
        );
    }

    #[test]
    fn test_fixed_routing() {
        let routing = SubjectRouting::default();
        assert_eq!(routing.subject_for(&RowMap::new()), "user.created");
    }

    #[test]
    fn test_column_routing() {
        let routing = SubjectRouting::FromColumn {
            column: "event_name".into(),
            fallback: "outbox.unknown".into(),
        };

        let mut row = RowMap::new();
        assert_eq!(routing.subject_for(&row), "outbox.unknown");

        row.insert("event_name".into(), Value::Null);
        assert_eq!(routing.subject_for(&row), "outbox.unknown");

        row.insert("event_name".into(), Value::String("order.placed".into()));
        assert_eq!(routing.subject_for(&row), "order.placed");
    }
}
