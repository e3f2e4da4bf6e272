//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod serve;
pub mod triage;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use inboxpilot::config::Config;
use inboxpilot::utils::logging::init_logging;

#[derive(Parser)]
#[command(name = "inboxpilot")]
#[command(version)]
#[command(about = "Email triage agent: categorise, research, escalate, draft and reply", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.inboxpilot/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway and the notification worker
    Serve,
    /// Triage a single email locally and print the report
    Triage {
        /// Raw email text
        #[arg(long, conflicts_with = "file")]
        email: Option<String>,
        /// Read the email text from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Record replies and drafts in memory instead of the configured mailbox
        #[arg(long)]
        dry_run: bool,
        /// Print the full session report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Validate configuration file
    Check,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Config::load().with_context(|| "Failed to load configuration"),
    }
}

/// Entry point for the CLI.
pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Commands::Config { action } = cli.command {
        return config::cmd_config(action, cli.config.as_deref()).await;
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging).with_context(|| "Failed to initialize logging")?;

    match cli.command {
        Commands::Serve => serve::cmd_serve(config).await,
        Commands::Triage {
            email,
            file,
            dry_run,
            json,
        } => triage::cmd_triage(config, email, file, dry_run, json).await,
        Commands::Config { .. } => Ok(()),
    }
}
