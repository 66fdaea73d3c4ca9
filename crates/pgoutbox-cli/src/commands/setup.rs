use anyhow::{Context, Result};
use colored::Colorize;
use pgoutbox_pg::replication::ensure_insert_publication;
use pgoutbox_pg::{connect_postgres, ensure_schema};

use crate::config::ProjectConfig;

pub async fn cmd_setup(config: ProjectConfig) -> Result<()> {
    println!("Setting up pgoutbox database objects...\n");

    let client = connect_postgres(&config.postgres_connection_string()?)
        .await
        .context("Failed to connect to Postgres")?;

    ensure_schema(&client)
        .await
        .context("Failed to create users/outbox tables")?;
    println!("  - users, outbox tables");

    let replication = &config.replication;
    let table = replication.table.trim();
    if table.is_empty() {
        println!("  - publication skipped (no [replication] table configured)");
    } else {
        let created = ensure_insert_publication(&client, &replication.publication, table)
            .await
            .with_context(|| format!("Failed to create publication {}", replication.publication))?;
        let state = if created { "created" } else { "already exists" };
        println!(
            "  - publication {} for inserts on {} ({})",
            replication.publication, table, state
        );
    }

    println!("\n{}", "Database objects ready!".green());
    println!("\nNext steps:");
    println!("  1. Run: pgoutbox app");
    println!("  2. Run: pgoutbox cdc\n");

    Ok(())
}
