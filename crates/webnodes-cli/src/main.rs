//! webnodes CLI - run web service watchers from the command line
//!
//! Provides commands for:
//! - Running every configured watcher until interrupted
//! - Serving the OAuth admin routes that store provider credentials
//! - One-shot provider queries
//! - Inspecting the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, query::QueryCommand, serve_auth::ServeAuthCommand, watch::WatchCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "webnodes", version, about = "Poll web services and emit what changed")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run all configured watchers until Ctrl+C
    Watch(WatchCommand),
    /// Serve the OAuth admin routes
    ServeAuth(ServeAuthCommand),
    /// Query a provider once and print the result
    #[command(subcommand)]
    Query(QueryCommand),
    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(webnodes_core::config::Config::default_path);

    let configured = webnodes_core::config::Config::load_or_default(&config_path)
        .logging
        .level;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, &configured)));

    // stdout carries emitted messages
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    match cli.command {
        Commands::Watch(cmd) => cmd.execute(format, &config_path).await,
        Commands::ServeAuth(cmd) => cmd.execute(format, &config_path).await,
        Commands::Query(cmd) => cmd.execute(format, &config_path).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
    }
}

/// Filter directive: `-v` wins over `logging.level` from the config file
fn log_filter(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}
