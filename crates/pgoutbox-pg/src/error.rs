use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{object} '{name}' already exists and cannot be reused")]
    AlreadyProvisioned { object: &'static str, name: String },

    #[error("failed to provision replication feed: {0}")]
    Provisioning(String),

    #[error("failed to start replication: {0}")]
    StreamStart(String),

    #[error("replication slot '{slot}' is in use by backend pid {pid}")]
    SlotInUse { slot: String, pid: i32 },

    #[error("replication protocol error: {0}")]
    Protocol(String),

    #[error("insert references unknown relation id {0}")]
    UnknownRelation(u32),

    #[error("failed to decode value {value:?} of type oid {type_oid}: {reason}")]
    Decode {
        type_oid: u32,
        value: String,
        reason: String,
    },

    #[error("server reported error: {0}")]
    Server(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),
}

impl PgError {
    /// Errors that mean the replication stream can no longer be trusted.
    pub fn is_fatal_protocol(&self) -> bool {
        matches!(
            self,
            PgError::Protocol(_)
                | PgError::UnknownRelation(_)
                | PgError::Decode { .. }
                | PgError::Server(_)
        )
    }
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let msg = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            PgError::Postgres(msg)
        } else {
            PgError::Postgres(e.to_string())
        }
    }
}

pub type PgResult<T> = Result<T, PgError>;
