pub mod chat;
pub mod config_cmd;
pub mod replay;

use std::path::Path;

use clap::{Parser, Subcommand};

use qm_domain::config::Config;

#[derive(Parser)]
#[command(name = "quorum", version, about = "Cognitive turn orchestrator")]
pub struct Cli {
    /// Path to the TOML configuration (default: ./quorum.toml if present).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Interactive chat REPL (the default).
    Chat {
        /// Session name; a fresh UUID session when omitted.
        #[arg(long)]
        session: Option<String>,
        /// Use the scripted offline provider instead of HTTP.
        #[arg(long)]
        offline: bool,
    },
    /// Rebuild projections from a recorded session and print them.
    Replay {
        /// Session id to replay.
        #[arg(long)]
        session: String,
        /// Only show this turn.
        #[arg(long)]
        turn: Option<u64>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the configuration and report issues.
    Validate,
}

/// Load configuration: explicit path, else `./quorum.toml` if present,
/// else built-in defaults.
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => Some(p.to_string()),
        None => Path::new("quorum.toml")
            .exists()
            .then(|| "quorum.toml".to_string()),
    };

    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))?
        }
        None => Config::default(),
    };
    Ok(config)
}
