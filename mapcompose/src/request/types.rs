//! Request value types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a render request cannot be canonicalized.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// The request names no tiles at all.
    #[error("render request contains no tiles")]
    EmptyTileSet,

    /// A placement or draw coordinate is NaN or infinite.
    #[error("non-finite value in field '{field}'")]
    NonFinite { field: &'static str },

    /// The draw spec has a negative width or height.
    #[error("draw extent must not be negative ({width}x{height})")]
    NegativeExtent { width: f64, height: f64 },

    /// A coordinate lies outside the pixel range targets can address.
    #[error("value of field '{field}' is out of range")]
    OutOfRange { field: &'static str },
}

/// Identifies one source tile: source name plus zoom/column/row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    /// Source name as declared by the style.
    pub source: String,
    /// Zoom level.
    pub zoom: u8,
    /// Tile column.
    pub x: u32,
    /// Tile row.
    pub y: u32,
}

impl TileId {
    /// Create a tile identifier.
    pub fn new(source: impl Into<String>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            zoom,
            x,
            y,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.source, self.zoom, self.x, self.y)
    }
}

/// One source tile and its placement on the composition plane.
///
/// `left`/`top` are plane coordinates of the tile's top-left corner and
/// `size` is the edge length the tile occupies on the plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSpecEntry {
    pub source: String,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub left: f64,
    pub top: f64,
    pub size: f64,
}

impl TileSpecEntry {
    /// Create a tile spec entry.
    pub fn new(
        source: impl Into<String>,
        zoom: u8,
        x: u32,
        y: u32,
        left: f64,
        top: f64,
        size: f64,
    ) -> Self {
        Self {
            source: source.into(),
            zoom,
            x,
            y,
            left,
            top,
            size,
        }
    }

    /// The source tile this entry refers to.
    pub fn tile_id(&self) -> TileId {
        TileId::new(self.source.clone(), self.zoom, self.x, self.y)
    }

    /// Same entry moved by `(-dx, -dy)`.
    pub(crate) fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            left: self.left - dx,
            top: self.top - dy,
            ..self.clone()
        }
    }
}

/// Maps a rectangle of the composition plane onto a draw target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawSpec {
    pub src_left: f64,
    pub src_top: f64,
    pub width: f64,
    pub height: f64,
    pub dest_left: f64,
    pub dest_top: f64,
}

impl DrawSpec {
    /// Create a draw spec.
    pub fn new(
        src_left: f64,
        src_top: f64,
        width: f64,
        height: f64,
        dest_left: f64,
        dest_top: f64,
    ) -> Self {
        Self {
            src_left,
            src_top,
            width,
            height,
            dest_left,
            dest_top,
        }
    }

    /// Right edge of the source rectangle (exclusive).
    pub fn src_right(&self) -> f64 {
        self.src_left + self.width
    }

    /// Bottom edge of the source rectangle (exclusive).
    pub fn src_bottom(&self) -> f64 {
        self.src_top + self.height
    }

    /// Whether the source rectangle overlaps the square block at
    /// `(block_left, block_top)` with edge `block_size`.
    ///
    /// Both rectangles are half-open.
    pub fn overlaps_block(&self, block_left: f64, block_top: f64, block_size: f64) -> bool {
        self.src_right() > block_left
            && self.src_left < block_left + block_size
            && self.src_bottom() > block_top
            && self.src_top < block_top + block_size
    }
}

/// A complete request as submitted by a caller, in caller coordinates.
///
/// Deserializable from JSON so requests can be stored or piped in:
///
/// ```json
/// {"tiles": [{"source": "osm", "zoom": 2, "x": 1, "y": 1,
///             "left": 0, "top": 0, "size": 256}],
///  "draw": {"src_left": 0, "src_top": 0, "width": 256, "height": 256,
///           "dest_left": 0, "dest_top": 0}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub tiles: Vec<TileSpecEntry>,
    pub draw: DrawSpec,
}

impl RenderRequest {
    /// Parse a request from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
