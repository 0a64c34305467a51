//! Painter that draws every placed tile as a solid square.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

use crate::paint::{PaintPass, Painter, TILE_EXTENT};
use crate::request::TileId;
use crate::style::Style;

/// One recorded paint pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub block_left: f64,
    pub block_top: f64,
    pub tiles: usize,
}

/// Shared log of the passes a [`FillPainter`] has made.
#[derive(Debug, Clone, Default)]
pub struct PaintLog {
    passes: Arc<Mutex<Vec<PassRecord>>>,
}

impl PaintLog {
    pub fn pass_count(&self) -> usize {
        self.passes.lock().len()
    }

    pub fn passes(&self) -> Vec<PassRecord> {
        self.passes.lock().clone()
    }
}

/// Fills each tile's square with a color derived from its id, once per
/// drawn layer that reads from the tile's source.
///
/// Background layers (no source) fill the whole surface. Layers that are
/// invisible or outside their zoom range at the pass's filter zoom are
/// skipped. Tile squares come from the position matrix, so placement
/// mistakes show up as misplaced pixels.
#[derive(Debug, Default)]
pub struct FillPainter {
    log: PaintLog,
}

impl FillPainter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the pass log that outlives the boxed painter.
    pub fn log(&self) -> PaintLog {
        self.log.clone()
    }

    /// Opaque color used for `tile`.
    pub fn color_for(tile: &TileId) -> Color {
        let mut hasher = DefaultHasher::new();
        tile.hash(&mut hasher);
        let [r, g, b, ..] = hasher.finish().to_le_bytes();
        Color::from_rgba8(r, g, b, 255)
    }

    /// Color used by background layers.
    pub fn background_color() -> Color {
        Color::from_rgba8(240, 240, 240, 255)
    }
}

impl Painter for FillPainter {
    fn render(&mut self, style: &dyn Style, pass: &PaintPass<'_>, surface: &mut Pixmap) {
        let surface_size = pass.surface_size as f32;
        let to_pixels = |(x, y): (f32, f32)| ((x + 1.0) / 2.0 * surface_size, (1.0 - y) / 2.0 * surface_size);

        for layer in style.layers() {
            if !layer.visible || !layer.within_zoom_range(pass.filter_zoom) {
                continue;
            }
            let Some(source) = layer.source.as_deref() else {
                surface.fill(Self::background_color());
                continue;
            };
            for placement in pass.placements {
                if placement.role != layer.role || placement.handle.tile().source != source {
                    continue;
                }
                let (left, top) = to_pixels(placement.matrix.apply(0.0, 0.0));
                let extent = TILE_EXTENT as f32;
                let (right, bottom) = to_pixels(placement.matrix.apply(extent, extent));
                let Some(rect) = Rect::from_ltrb(left, top, right, bottom) else {
                    continue;
                };
                let mut paint = Paint::default();
                paint.set_color(Self::color_for(placement.handle.tile()));
                paint.anti_alias = false;
                surface.fill_rect(rect, &paint, Transform::identity(), None);
            }
        }

        self.log.passes.lock().push(PassRecord {
            block_left: pass.block_left,
            block_top: pass.block_top,
            tiles: pass.placements.len(),
        });
    }
}
