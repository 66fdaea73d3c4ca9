//! Publication management over a regular (non-replication) connection.

use tokio_postgres::Client;
use tracing::info;

use crate::error::PgResult;

/// Quote an identifier for use in SQL (double quotes).
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name (e.g., "public.outbox" -> "public"."outbox").
pub fn quote_table_name(s: &str) -> String {
    if let Some((schema, table)) = s.split_once('.') {
        format!("{}.{}", quote_ident(schema), quote_ident(table))
    } else {
        quote_ident(s)
    }
}

/// Check if a publication exists.
pub async fn publication_exists(client: &Client, publication_name: &str) -> PgResult<bool> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_publication WHERE pubname = $1)",
            &[&publication_name],
        )
        .await?
        .get(0);

    Ok(exists)
}

/// Create a publication that only replicates inserts into `table`.
pub async fn create_insert_publication(
    client: &Client,
    publication_name: &str,
    table: &str,
) -> PgResult<()> {
    info!(publication = %publication_name, table = %table, "Creating publication");
    client
        .execute(
            &format!(
                "CREATE PUBLICATION {} FOR TABLE {} WITH (publish = 'insert')",
                quote_ident(publication_name),
                quote_table_name(table)
            ),
            &[],
        )
        .await?;

    Ok(())
}

/// Create the publication unless it already exists. Returns whether it was created.
pub async fn ensure_insert_publication(
    client: &Client,
    publication_name: &str,
    table: &str,
) -> PgResult<bool> {
    if publication_exists(client, publication_name).await? {
        info!(publication = %publication_name, "Using existing publication");
        return Ok(false);
    }

    create_insert_publication(client, publication_name, table).await?;
    Ok(true)
}

/// Drop a publication.
pub async fn drop_publication(client: &Client, publication_name: &str) -> PgResult<()> {
    info!(publication = %publication_name, "Dropping publication");
    client
        .execute(
            &format!("DROP PUBLICATION IF EXISTS {}", quote_ident(publication_name)),
            &[],
        )
        .await?;

    Ok(())
}
