use std::future::Future;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::client::EventPublisher;
use crate::error::{BusError, BusResult};

/// A published message captured by [`MockPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

impl PublishedMessage {
    /// Decode the payload as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// An in-memory publisher for testing.
#[derive(Clone, Default)]
pub struct MockPublisher {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    published: Vec<PublishedMessage>,
    /// If set, every publish fails with this error.
    fail_with: Option<String>,
    attempts: usize,
    flushes: usize,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock publisher that simulates an unreachable bus.
    pub fn failing(error_message: impl Into<String>) -> Self {
        let publisher = Self::new();
        publisher.set_failing(Some(error_message.into()));
        publisher
    }

    /// Start or stop failing publishes.
    pub fn set_failing(&self, error_message: Option<String>) {
        self.state.lock().unwrap().fail_with = error_message;
    }

    /// All successfully published messages, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Messages published under one subject.
    pub fn published_to(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.subject == subject)
            .collect()
    }

    /// Number of publish calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().unwrap().flushes
    }
}

impl EventPublisher for MockPublisher {
    fn publish(&self, subject: &str, payload: Bytes) -> impl Future<Output = BusResult<()>> + Send {
        let state = self.state.clone();
        let subject = subject.to_string();
        async move {
            let mut state = state.lock().unwrap();
            state.attempts += 1;

            if let Some(ref error) = state.fail_with {
                return Err(BusError::Publish {
                    subject,
                    message: error.clone(),
                });
            }

            state.published.push(PublishedMessage { subject, payload });
            Ok(())
        }
    }

    fn flush(&self) -> impl Future<Output = BusResult<()>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();
            if let Some(ref error) = state.fail_with {
                return Err(BusError::Flush(error.clone()));
            }
            state.flushes += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_publishes() {
        let publisher = MockPublisher::new();
        publisher
            .publish("user.created", Bytes::from_static(b"{\"a\":1}"))
            .await
            .unwrap();

        let published = publisher.published_to("user.created");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].json(), serde_json::json!({"a": 1}));
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let publisher = MockPublisher::failing("bus unreachable");
        let result = publisher.publish("user.created", Bytes::new()).await;
        assert!(matches!(result, Err(BusError::Publish { .. })));
        assert!(publisher.published().is_empty());
        assert_eq!(publisher.attempts(), 1);

        publisher.set_failing(None);
        publisher.publish("user.created", Bytes::new()).await.unwrap();
        assert_eq!(publisher.published().len(), 1);
    }
}
