use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pgoutbox")]
#[command(about = "Relay transactional outbox rows from Postgres to NATS")]
#[command(version)]
pub struct Cli {
    /// Environment to load (loads .env.{ENV} instead of .env)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Path to pgoutbox.toml config file (defaults apply if it is missing)
    #[arg(short, long, global = true, default_value = "pgoutbox.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP write path (POST /users)
    App {
        /// Address to listen on (overrides [http] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Stream outbox inserts from logical replication to NATS
    Cdc {
        /// Replication slot name (overrides [replication] slot)
        #[arg(long)]
        slot: Option<String>,

        /// Keep the slot after exit instead of creating a temporary one
        #[arg(long)]
        persistent_slot: bool,
    },

    /// Create the users/outbox tables and the insert publication
    Setup,
}
