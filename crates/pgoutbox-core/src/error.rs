use thiserror::Error;

/// Errors that can occur in pgoutbox-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("invalid column type for '{column}': expected {expected}, got {actual}")]
    InvalidColumnType {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
