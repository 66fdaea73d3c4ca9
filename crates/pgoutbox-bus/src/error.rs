use thiserror::Error;

/// Errors from message bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to message bus: {0}")]
    Connect(String),

    #[error("publish to '{subject}' failed: {message}")]
    Publish { subject: String, message: String },

    #[error("publish to '{subject}' timed out after {millis}ms")]
    Timeout { subject: String, millis: u64 },

    #[error("flush failed: {0}")]
    Flush(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BusResult<T> = Result<T, BusError>;
