//! Configuration CLI commands.
//!
//! `config show` prints the effective settings in INI form so they can be
//! saved and edited; `config check` validates a file without rendering.

use std::path::PathBuf;

use clap::Subcommand;
use mapcompose::MapcomposeConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Validate a configuration file
    Check {
        /// Path to the INI file
        path: PathBuf,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config: &MapcomposeConfig) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            print!("{}", format_ini(config));
            Ok(())
        }
        ConfigCommands::Check { path } => {
            MapcomposeConfig::load(&path)?;
            println!("{}: ok", path.display());
            Ok(())
        }
    }
}

/// Render `config` as INI text accepted by [`MapcomposeConfig::parse`].
fn format_ini(config: &MapcomposeConfig) -> String {
    let renderer = &config.renderer;
    let logging = &config.logging;
    let directory = logging
        .directory
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_default();

    format!(
        "[renderer]\n\
         surface_size = {}\n\
         zoom = {}\n\
         min_zoom = {}\n\
         max_zoom = {}\n\
         filter_zoom = {}\n\
         event_capacity = {}\n\
         \n\
         [logging]\n\
         filter = {}\n\
         directory = {}\n\
         file_prefix = {}\n\
         ansi = {}\n",
        renderer.surface_size,
        renderer.zoom,
        renderer.min_zoom,
        renderer.max_zoom,
        renderer.filter_zoom,
        renderer.event_capacity,
        logging.filter,
        directory,
        logging.file_prefix,
        logging.ansi,
    )
}
