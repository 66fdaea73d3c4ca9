//! Control-plane Postgres connections with TLS chosen by `sslmode`.

use std::sync::Arc;

use rustls::ClientConfig;
use tokio_postgres::Client;
use tokio_postgres_rustls_improved::MakeRustlsConnect;

use crate::error::{PgError, PgResult};
use crate::replication::session::{SessionConfig, SslMode};

/// Connect to Postgres with appropriate TLS settings based on sslmode in connection string.
/// Spawns the connection task and returns only the client.
pub async fn connect_postgres(connection_string: &str) -> PgResult<Client> {
    if requires_tls(connection_string) {
        let (client, connection) = tokio_postgres::connect(connection_string, tls_connector()?)
            .await
            .map_err(|e| PgError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        Ok(client)
    } else {
        let (client, connection) = tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
            .await
            .map_err(|e| PgError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        Ok(client)
    }
}

/// rustls connector trusting the webpki root set.
pub(crate) fn tls_connector() -> PgResult<MakeRustlsConnect> {
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| PgError::Connection(format!("TLS config error: {}", e)))?
        .with_root_certificates(root_certs())
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(config))
}

fn root_certs() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Whether the connection string's sslmode demands TLS.
fn requires_tls(connection_string: &str) -> bool {
    SessionConfig::from_connection_string(connection_string)
        .map(|c| c.sslmode)
        .unwrap_or_default()
        .requires_tls()
}
