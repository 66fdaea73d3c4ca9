use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use pgoutbox_bus::SubjectRouting;
use pgoutbox_core::USER_CREATED;
use pgoutbox_pg::{DispatchConfig, FeedSpec, Lsn, StreamOptions};

/// Project configuration from pgoutbox.toml
///
/// Every section is optional; a missing file yields the defaults, which
/// read the connection strings from `DATABASE_URL` and `NATS_URL`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub postgres: PostgresConfig,
    pub nats: NatsConfig,
    pub replication: ReplicationConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub connection_string: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            connection_string: "${DATABASE_URL}".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Subject for every row unless `subject_column` is set.
    pub subject: String,
    /// Route each row by the text of this column, falling back to `subject`.
    pub subject_column: Option<String>,
    pub publish_timeout_ms: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "${NATS_URL}".to_string(),
            subject: USER_CREATED.to_string(),
            subject_column: None,
            publish_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub slot: String,
    pub publication: String,
    /// Table the publication covers. Empty leaves the publication unmanaged.
    pub table: String,
    pub temporary_slot: bool,
    pub status_interval_secs: u64,
    pub proto_version: u32,
    pub messages: bool,
    pub streaming: bool,
    /// Explicit `X/Y` start position; otherwise the server's current position.
    pub start_lsn: Option<String>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            slot: "pglogrepl_demo".to_string(),
            publication: "pglogrepl_demo".to_string(),
            table: "outbox".to_string(),
            temporary_slot: true,
            status_interval_secs: 10,
            proto_version: 2,
            messages: true,
            streaming: true,
            start_lsn: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ProjectConfig {
    /// Load the config file, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve environment variables in a string.
    /// Supports ${VAR_NAME} syntax.
    pub fn resolve_env(&self, s: &str) -> Result<String> {
        let mut result = s.to_string();

        while let Some(start) = result.find("${") {
            let Some(end) = result[start..].find('}') else {
                break;
            };
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).with_context(|| {
                format!(
                    "Environment variable {} is not set (referenced in pgoutbox.toml)",
                    var_name
                )
            })?;
            result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        }

        Ok(result)
    }

    /// Get the resolved Postgres connection string.
    pub fn postgres_connection_string(&self) -> Result<String> {
        self.resolve_env(&self.postgres.connection_string)
    }

    /// Get the resolved NATS server URL.
    pub fn nats_url(&self) -> Result<String> {
        self.resolve_env(&self.nats.url)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.nats.publish_timeout_ms)
    }

    pub fn routing(&self) -> SubjectRouting {
        match &self.nats.subject_column {
            Some(column) => SubjectRouting::FromColumn {
                column: column.clone(),
                fallback: self.nats.subject.clone(),
            },
            None => SubjectRouting::Fixed(self.nats.subject.clone()),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            status_interval: Duration::from_secs(self.replication.status_interval_secs),
            routing: self.routing(),
        }
    }

    pub fn feed_spec(&self) -> FeedSpec {
        let table = self.replication.table.trim();
        FeedSpec {
            slot: self.replication.slot.clone(),
            publication: self.replication.publication.clone(),
            table: (!table.is_empty()).then(|| table.to_string()),
            temporary: self.replication.temporary_slot,
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            proto_version: self.replication.proto_version,
            publication_names: vec![self.replication.publication.clone()],
            messages: self.replication.messages,
            streaming: self.replication.streaming,
        }
    }

    pub fn start_lsn(&self) -> Result<Option<Lsn>> {
        self.replication
            .start_lsn
            .as_deref()
            .map(|s| Lsn::parse(s).with_context(|| format!("Invalid start_lsn: {}", s)))
            .transpose()
    }
}
