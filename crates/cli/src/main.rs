use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use qm_cli::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to chat when no subcommand is given.
        None => {
            init_tracing();
            let config = qm_cli::cli::load_config(cli.config.as_deref())?;
            qm_cli::cli::chat::run(Arc::new(config), None, false).await
        }
        Some(Command::Chat { session, offline }) => {
            init_tracing();
            let config = qm_cli::cli::load_config(cli.config.as_deref())?;
            qm_cli::cli::chat::run(Arc::new(config), session, offline).await
        }
        Some(Command::Replay { session, turn }) => {
            let config = qm_cli::cli::load_config(cli.config.as_deref())?;
            qm_cli::cli::replay::run(&config, &session, turn)
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = qm_cli::cli::load_config(cli.config.as_deref())?;
            qm_cli::cli::config_cmd::show(&config)
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = qm_cli::cli::load_config(cli.config.as_deref())?;
            if !qm_cli::cli::config_cmd::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,qm_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
