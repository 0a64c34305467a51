//! CLI error type.

use std::fmt;

use mapcompose::logging::LoggingError;
use mapcompose::{ConfigError, RenderError, RendererError};

/// Everything that can end a CLI run.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file could not be loaded.
    Config(ConfigError),
    /// Logging could not be initialized.
    Logging(LoggingError),
    /// The renderer could not be created.
    Renderer(RendererError),
    /// The render request failed.
    Render(RenderError),
    /// Reading a request or style file failed.
    Io(std::io::Error),
    /// A request or style file is not valid JSON.
    Json(serde_json::Error),
    /// Writing the output image failed.
    Image(image::ImageError),
    /// Invalid command-line arguments.
    Argument(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Renderer(e) => write!(f, "Renderer error: {}", e),
            CliError::Render(e) => write!(f, "Render failed: {}", e),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
            CliError::Json(e) => write!(f, "Invalid JSON: {}", e),
            CliError::Image(e) => write!(f, "Image error: {}", e),
            CliError::Argument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Renderer(e) => Some(e),
            CliError::Render(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::Json(e) => Some(e),
            CliError::Image(e) => Some(e),
            CliError::Argument(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<RendererError> for CliError {
    fn from(e: RendererError) -> Self {
        CliError::Renderer(e)
    }
}

impl From<RenderError> for CliError {
    fn from(e: RenderError) -> Self {
        CliError::Render(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<image::ImageError> for CliError {
    fn from(e: image::ImageError) -> Self {
        CliError::Image(e)
    }
}
