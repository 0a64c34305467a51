//! Renderer and logging configuration.
//!
//! Both structs have defaults suitable for an interactive map and can be
//! loaded from an INI file:
//!
//! ```ini
//! [renderer]
//! surface_size = 1024
//! zoom = 3
//! min_zoom = 0
//! max_zoom = 20
//! filter_zoom = 15
//!
//! [logging]
//! filter = mapcompose=debug
//! directory = /var/log/mapcompose
//! file_prefix = mapcompose.log
//! ansi = false
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

// ==================== Renderer Defaults ====================

/// Default edge length of the offscreen surface in pixels.
pub const DEFAULT_SURFACE_SIZE: u32 = 1024;

/// Default zoom the style is evaluated at.
pub const DEFAULT_ZOOM: f64 = 0.0;

/// Default lower clamp for the filter zoom.
pub const DEFAULT_MIN_ZOOM: f64 = 0.0;

/// Default upper clamp for the filter zoom.
pub const DEFAULT_MAX_ZOOM: f64 = 20.0;

/// Default zoom used by painters to drop out-of-range layers.
pub const DEFAULT_FILTER_ZOOM: f64 = 15.0;

/// Default capacity of the renderer event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

// ==================== Logging Defaults ====================

/// Default `EnvFilter` directive.
pub const DEFAULT_LOG_FILTER: &str = "mapcompose=info";

/// Default file name prefix for the daily log file.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "mapcompose.log";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Ini(#[from] ini::ParseError),

    #[error("invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ini::Error> for ConfigError {
    fn from(err: ini::Error) -> Self {
        match err {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Ini(e),
        }
    }
}

/// Settings for one renderer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    // ==================== Surface ====================
    /// Edge length of the square offscreen surface, in pixels.
    ///
    /// Composites larger than this are painted in several blocks.
    /// Default: 1024.
    pub surface_size: u32,

    // ==================== Zoom ====================
    /// Zoom the style is updated at. Default: 0.
    pub zoom: f64,

    /// Lower clamp for `filter_for_zoom`. Default: 0.
    pub min_zoom: f64,

    /// Upper clamp for `filter_for_zoom`. Default: 20.
    pub max_zoom: f64,

    /// Zoom painters use to drop layers outside their range. Default: 15.
    pub filter_zoom: f64,

    // ==================== Events ====================
    /// Capacity of the broadcast channel for renderer events. Default: 16.
    pub event_capacity: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: DEFAULT_SURFACE_SIZE,
            zoom: DEFAULT_ZOOM,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            filter_zoom: DEFAULT_FILTER_ZOOM,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RendererConfig {
    pub fn with_surface_size(mut self, surface_size: u32) -> Self {
        self.surface_size = surface_size;
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_filter_zoom(mut self, filter_zoom: f64) -> Self {
        self.filter_zoom = filter_zoom;
        self
    }

    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.surface_size == 0 {
            return Err(ConfigError::Invalid("surface_size must be positive".into()));
        }
        for (name, value) in [
            ("zoom", self.zoom),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
            ("filter_zoom", self.filter_zoom),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Read the `[renderer]` section, keeping defaults for absent keys.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(RENDERER_SECTION)) else {
            return Ok(config);
        };
        if let Some(v) = section.get("surface_size") {
            config.surface_size = parse_value(RENDERER_SECTION, "surface_size", v)?;
        }
        if let Some(v) = section.get("zoom") {
            config.zoom = parse_value(RENDERER_SECTION, "zoom", v)?;
        }
        if let Some(v) = section.get("min_zoom") {
            config.min_zoom = parse_value(RENDERER_SECTION, "min_zoom", v)?;
        }
        if let Some(v) = section.get("max_zoom") {
            config.max_zoom = parse_value(RENDERER_SECTION, "max_zoom", v)?;
        }
        if let Some(v) = section.get("filter_zoom") {
            config.filter_zoom = parse_value(RENDERER_SECTION, "filter_zoom", v)?;
        }
        if let Some(v) = section.get("event_capacity") {
            config.event_capacity = parse_value(RENDERER_SECTION, "event_capacity", v)?;
        }
        Ok(config)
    }
}

/// Settings for [`init_logging`](crate::logging::init_logging).
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,

    /// Directory for a daily rolling log file; stderr only when `None`.
    pub directory: Option<PathBuf>,

    /// File name prefix inside `directory`.
    pub file_prefix: String,

    /// Colored stderr output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Read the `[logging]` section, keeping defaults for absent keys.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(LOGGING_SECTION)) else {
            return Ok(config);
        };
        if let Some(v) = section.get("filter") {
            config.filter = v.trim().to_string();
        }
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            config.directory = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = section.get("file_prefix") {
            config.file_prefix = v.trim().to_string();
        }
        if let Some(v) = section.get("ansi") {
            config.ansi = parse_value(LOGGING_SECTION, "ansi", v)?;
        }
        Ok(config)
    }
}

const RENDERER_SECTION: &str = "renderer";
const LOGGING_SECTION: &str = "logging";

/// Full configuration file contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapcomposeConfig {
    pub renderer: RendererConfig,
    pub logging: LoggingConfig,
}

impl MapcomposeConfig {
    /// Load and validate an INI file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path.as_ref())?;
        Self::from_ini(&ini)
    }

    /// Parse and validate INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let config = Self {
            renderer: RendererConfig::from_ini(ini)?,
            logging: LoggingConfig::from_ini(ini)?,
        };
        config.renderer.validate()?;
        Ok(config)
    }
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    })
}
