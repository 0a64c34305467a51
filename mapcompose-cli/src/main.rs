//! mapcompose CLI - headless compositing of map render requests
//!
//! Drives the mapcompose library with its in-memory collaborators: tiles
//! load immediately (or fail on request) and are painted as flat colored
//! squares, which makes the coalescing and blitting easy to inspect.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use mapcompose::logging::init_logging;
use mapcompose::MapcomposeConfig;
use tracing::debug;

use commands::config::ConfigCommands;
use commands::render::RenderArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "mapcompose", version, about)]
struct Cli {
    /// Configuration file (INI)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Composite tiles into an image
    Render(RenderArgs),

    /// Inspect and validate configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => MapcomposeConfig::load(path)?,
        None => MapcomposeConfig::default(),
    };

    // Keep the guard alive so buffered file output is flushed on exit.
    let _guard = init_logging(&config.logging)?;
    debug!(config = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Render(args) => commands::render::run(args, &config.renderer),
        Commands::Config(command) => commands::config::run(command, &config),
    }
}
