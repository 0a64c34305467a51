//! Painter contract and per-block tile placement.

use tiny_skia::Pixmap;

use crate::style::{LayerRole, Style};
use crate::tile::TileHandle;

/// Coordinate extent of one vector tile.
pub const TILE_EXTENT: f64 = 8192.0;

/// Column-major 4x4 matrix mapping tile data coordinates to clip space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosMatrix(pub [f32; 16]);

impl PosMatrix {
    /// Matrix for a tile whose top-left corner sits at `(translate_x,
    /// translate_y)` surface pixels and spans `tile_size` pixels.
    ///
    /// Tile coordinates `[0, TILE_EXTENT]` map onto the tile's square;
    /// surface pixel `(0, 0)` is clip `(-1, 1)`.
    pub fn for_tile(translate_x: f64, translate_y: f64, tile_size: f64, surface_size: u32) -> Self {
        let surface = surface_size as f64;
        let factor = tile_size / surface;
        let scale_x = 2.0 / TILE_EXTENT * factor;
        let scale_y = -2.0 / TILE_EXTENT * factor;
        let offset_x = -1.0 + 2.0 * translate_x / surface;
        let offset_y = 1.0 - 2.0 * translate_y / surface;

        let mut m = [0.0f32; 16];
        m[0] = scale_x as f32;
        m[5] = scale_y as f32;
        m[10] = 1.0;
        m[12] = offset_x as f32;
        m[13] = offset_y as f32;
        m[15] = 1.0;
        PosMatrix(m)
    }

    /// Apply to a tile coordinate, returning clip-space `(x, y)`.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.0;
        (m[0] * x + m[4] * y + m[12], m[1] * x + m[5] * y + m[13])
    }
}

/// A loaded tile positioned relative to the current block.
#[derive(Debug, Clone)]
pub struct TilePlacement {
    pub handle: TileHandle,
    pub role: LayerRole,
    /// Left edge in surface pixels (may be negative or past the surface).
    pub left: f64,
    /// Top edge in surface pixels.
    pub top: f64,
    pub size: f64,
    pub matrix: PosMatrix,
}

/// Everything a painter needs for one block.
#[derive(Debug)]
pub struct PaintPass<'a> {
    /// Composition-plane origin of the block.
    pub block_left: f64,
    pub block_top: f64,
    pub surface_size: u32,
    /// Zoom used to drop layers outside their min/max range.
    pub filter_zoom: f64,
    pub placements: &'a [TilePlacement],
}

/// Performs one full paint pass of the offscreen surface.
///
/// Synchronous from the coordinator's point of view: when `render` returns
/// the surface holds the pixels to blit.
pub trait Painter: Send {
    fn render(&mut self, style: &dyn Style, pass: &PaintPass<'_>, surface: &mut Pixmap);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_surface_tile_spans_clip_space() {
        let m = PosMatrix::for_tile(0.0, 0.0, 1024.0, 1024);
        assert_eq!(m.apply(0.0, 0.0), (-1.0, 1.0));
        assert_eq!(m.apply(TILE_EXTENT as f32, TILE_EXTENT as f32), (1.0, -1.0));
    }

    #[test]
    fn test_translated_quarter_tile() {
        // 256px tile at (512, 256) on a 1024px surface.
        let m = PosMatrix::for_tile(512.0, 256.0, 256.0, 1024);
        let (x0, y0) = m.apply(0.0, 0.0);
        assert!((x0 - 0.0).abs() < 1e-6);
        assert!((y0 - 0.5).abs() < 1e-6);
        let (x1, y1) = m.apply(TILE_EXTENT as f32, TILE_EXTENT as f32);
        assert!((x1 - 0.5).abs() < 1e-6);
        assert!((y1 - 0.0).abs() < 1e-6);
    }
}
