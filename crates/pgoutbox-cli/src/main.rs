use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod env;

use cli::{Cli, Commands};
use config::ProjectConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pgoutbox=info".parse()?))
        .init();

    let cli = Cli::parse();

    env::load_dotenv_from_ancestors(cli.env.as_deref())?;
    let config = ProjectConfig::load(&cli.config)?;

    match cli.command {
        Commands::App { bind } => commands::cmd_app(config, bind).await,
        Commands::Cdc {
            slot,
            persistent_slot,
        } => commands::cmd_cdc(config, slot, persistent_slot).await,
        Commands::Setup => commands::cmd_setup(config).await,
    }
}
