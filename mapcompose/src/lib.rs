//! mapcompose - render-request coordination for tiled vector maps
//!
//! Many callers ask for rectangles of a map drawn from sets of source
//! tiles. This library coalesces requests for the same tile set, holds the
//! tiles while they load, paints each distinct tile set once through a
//! single offscreen surface, and copies the result into every caller's draw
//! target. Style changes are sequenced so a burst of them triggers one
//! cancel-and-update cycle.
//!
//! The map engine itself (style evaluation, tile fetching, painting) sits
//! behind the [`style::Style`], [`tile::SourceCache`] and [`paint::Painter`]
//! traits. [`standalone`] provides simple in-memory implementations.

pub mod config;
pub mod logging;
pub mod paint;
pub mod render;
pub mod renderer;
pub mod request;
pub mod sequencer;
pub mod standalone;
pub mod style;
pub mod tile;

pub use config::{ConfigError, LoggingConfig, MapcomposeConfig, RendererConfig};
pub use render::{RenderCompletion, RenderError, RenderResult, RenderToken};
pub use renderer::{ConfigChange, Renderer, RendererError, RendererEvent, RendererParts, StagedConfigChange};
pub use request::{DrawSpec, RenderRequest, TileSpecEntry};
