//! Block-wise compositing of a settled render.
//!
//! One offscreen surface of `surface_size x surface_size` pixels is reused
//! for every block. The union of all consumers' source rectangles is walked
//! in surface-sized blocks; each block that overlaps at least one consumer
//! is painted once and then copied into every overlapping consumer.
//!
//! ```text
//!   composition plane (canonical coordinates)
//!   ┌──────────┬──────────┬──────────┐
//!   │ block 0  │ block 1  │ block 2  │   ┌───────────┐
//!   │   ┌──────┼───┐      │          │   │ consumer A │ dest
//!   │   │  A   │   │      │          │──►│  target    │
//!   ├───┼──────┼───┼──────┼──────────┤   └───────────┘
//!   │   └──────┼───┘      │  ┌────┐  │
//!   │ block 3  │ block 4  │  │ B  │  │   block 4 overlaps nobody:
//!   └──────────┴──────────┴──┴────┴──┘   never painted
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Range;

use tiny_skia::{Color, Pixmap};
use tracing::{debug, trace, warn};

use super::completion::{RenderError, RenderResult};
use super::registry::{AcquiredTile, Consumer, PendingRender};
use crate::paint::{PaintPass, Painter, PixelRect, PosMatrix, TilePlacement};
use crate::renderer::RendererError;
use crate::request::DrawSpec;
use crate::style::{LayerRole, Style};
use crate::tile::{RenderingTile, SourceCacheKey, TileLifecycleAdapter, TileLoadState};

/// Per-pass inputs that come from the renderer rather than the render.
pub struct Frame<'a> {
    pub style: &'a dyn Style,
    pub tiles: &'a TileLifecycleAdapter,
    /// Current zoom, deciding which layer roles are drawn.
    pub zoom: f64,
    /// Zoom the painter uses to drop out-of-range layers.
    pub filter_zoom: f64,
}

/// Bounding rectangle of every consumer's source rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SourceBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl SourceBounds {
    fn of(consumers: &[Consumer]) -> Option<Self> {
        let mut draws = consumers.iter().map(|c| &c.draw);
        let first = draws.next()?;
        let mut bounds = SourceBounds {
            left: first.src_left,
            top: first.src_top,
            right: first.src_right(),
            bottom: first.src_bottom(),
        };
        for draw in draws {
            bounds.left = bounds.left.min(draw.src_left);
            bounds.top = bounds.top.min(draw.src_top);
            bounds.right = bounds.right.max(draw.src_right());
            bounds.bottom = bounds.bottom.max(draw.src_bottom());
        }
        Some(bounds)
    }

    /// Origins of the blocks at least one of `draws` overlaps, row by row.
    ///
    /// The grid is anchored at the bounds' top-left corner. Only the index
    /// ranges each draw touches are visited, so empty space between distant
    /// consumers costs nothing.
    pub(crate) fn blocks<'a>(
        &self,
        draws: impl IntoIterator<Item = &'a DrawSpec>,
        block_size: f64,
    ) -> Vec<(f64, f64)> {
        let mut indices = BTreeSet::new();
        for draw in draws {
            let (columns, rows) = (
                block_range(draw.src_left - self.left, draw.src_right() - self.left, block_size),
                block_range(draw.src_top - self.top, draw.src_bottom() - self.top, block_size),
            );
            for row in rows {
                for column in columns.clone() {
                    indices.insert((row, column));
                }
            }
        }
        indices
            .into_iter()
            .map(|(row, column)| {
                (
                    self.left + column as f64 * block_size,
                    self.top + row as f64 * block_size,
                )
            })
            .collect()
    }
}

/// Indices of the blocks the half-open span `[start, end)` overlaps.
fn block_range(start: f64, end: f64, block_size: f64) -> Range<i64> {
    if !(end > start) {
        return 0..0;
    }
    // Saturating float-to-int casts keep absurd spans finite.
    let first = (start / block_size).floor() as i64;
    let last = (end / block_size).ceil() as i64;
    first..last
}

/// The part of a consumer's rectangle visible in one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Blit {
    pub src: PixelRect,
    pub dest_x: i32,
    pub dest_y: i32,
}

impl Blit {
    /// Intersect `draw` with the block at `(block_left, block_top)`.
    ///
    /// Surface coordinates are truncated toward zero.
    pub(crate) fn for_block(draw: &DrawSpec, block_left: f64, block_top: f64, block_size: f64) -> Self {
        let src_left = (draw.src_left - block_left).max(0.0) as i32;
        let src_right = (draw.src_right() - block_left).min(block_size) as i32;
        let src_top = (draw.src_top - block_top).max(0.0) as i32;
        let src_bottom = (draw.src_bottom() - block_top).min(block_size) as i32;
        let dest_left = draw.dest_left + (block_left - draw.src_left).max(0.0);
        let dest_top = draw.dest_top + (block_top - draw.src_top).max(0.0);
        Blit {
            src: PixelRect::new(src_left, src_top, src_right - src_left, src_bottom - src_top),
            dest_x: dest_left as i32,
            dest_y: dest_top as i32,
        }
    }
}

/// Owns the offscreen surface and the painter.
pub struct Compositor {
    surface: Pixmap,
    surface_size: u32,
    painter: Box<dyn Painter>,
}

impl Compositor {
    /// Allocate a square surface of `surface_size` pixels.
    pub fn new(surface_size: u32, painter: Box<dyn Painter>) -> Result<Self, RendererError> {
        let surface = Pixmap::new(surface_size, surface_size).ok_or_else(|| {
            RendererError::InvalidConfig(format!("cannot allocate a {surface_size}px surface"))
        })?;
        Ok(Self {
            surface,
            surface_size,
            painter,
        })
    }

    pub fn surface_size(&self) -> u32 {
        self.surface_size
    }

    /// Draw a settled render into every consumer's target.
    ///
    /// `settled` holds the outcome of each handle keyed by handle id; a
    /// handle missing from it is read from its live state.
    ///
    /// Loaded tiles are left registered as currently rendering; the caller
    /// clears them once the render is finished.
    pub fn composite(
        &mut self,
        render: &PendingRender,
        settled: &HashMap<u64, TileLoadState>,
        frame: &Frame<'_>,
    ) -> RenderResult {
        let state_of = |tile: &AcquiredTile| {
            settled
                .get(&tile.handle.id())
                .cloned()
                .unwrap_or_else(|| tile.handle.state())
        };

        let total = render.entries.len();
        let mut bad = vec![false; total];
        for tile in &render.tiles {
            if let TileLoadState::Failed(reason) = state_of(tile) {
                warn!(tile = %tile.handle.tile(), role = ?tile.role, %reason, "Tile not available");
                if let Some(flag) = bad.get_mut(tile.entry_index) {
                    *flag = true;
                }
            }
        }
        let failed = bad.iter().filter(|b| **b).count();

        if failed == total {
            for consumer in &render.consumers {
                let draw = &consumer.draw;
                consumer.target.lock().clear_rect(PixelRect::new(
                    draw.dest_left as i32,
                    draw.dest_top as i32,
                    draw.width as i32,
                    draw.height as i32,
                ));
            }
            return Err(RenderError::TotalTileFailure { failed, total });
        }
        let outcome = if failed > 0 {
            Err(RenderError::PartialTileFailure { failed, total })
        } else {
            Ok(())
        };

        let loaded: Vec<&AcquiredTile> = render
            .tiles
            .iter()
            .filter(|tile| state_of(*tile).is_loaded())
            .collect();

        let drawn_roles = drawn_roles(frame.style, frame.zoom);
        let mut groups: HashMap<SourceCacheKey, Vec<RenderingTile>> = HashMap::new();
        for tile in &loaded {
            if !drawn_roles.contains(&tile.role) {
                continue;
            }
            groups
                .entry(SourceCacheKey::new(tile.role, tile.entry.source.clone()))
                .or_default()
                .push(RenderingTile {
                    handle: tile.handle.clone(),
                    left: tile.entry.left,
                    top: tile.entry.top,
                    size: tile.entry.size,
                });
        }
        frame.tiles.set_currently_rendering(groups);

        if let Some(bounds) = SourceBounds::of(&render.consumers) {
            let block_size = self.surface_size as f64;
            let draws = render.consumers.iter().map(|c| &c.draw);
            for (block_left, block_top) in bounds.blocks(draws, block_size) {
                let overlapping: Vec<&Consumer> = render
                    .consumers
                    .iter()
                    .filter(|c| c.draw.overlaps_block(block_left, block_top, block_size))
                    .collect();
                if overlapping.is_empty() {
                    trace!(block_left, block_top, "Skipping block with no consumer");
                    continue;
                }

                let placements: Vec<TilePlacement> = loaded
                    .iter()
                    .map(|tile| {
                        let left = tile.entry.left - block_left;
                        let top = tile.entry.top - block_top;
                        TilePlacement {
                            handle: tile.handle.clone(),
                            role: tile.role,
                            left,
                            top,
                            size: tile.entry.size,
                            matrix: PosMatrix::for_tile(left, top, tile.entry.size, self.surface_size),
                        }
                    })
                    .collect();

                frame.style.update_placement();
                self.surface.fill(Color::TRANSPARENT);
                let pass = PaintPass {
                    block_left,
                    block_top,
                    surface_size: self.surface_size,
                    filter_zoom: frame.filter_zoom,
                    placements: &placements,
                };
                self.painter.render(frame.style, &pass, &mut self.surface);

                for consumer in overlapping {
                    let blit = Blit::for_block(&consumer.draw, block_left, block_top, block_size);
                    consumer
                        .target
                        .lock()
                        .copy_from(self.surface.as_ref(), blit.src, blit.dest_x, blit.dest_y);
                }
                debug!(
                    tile_set = %render.tile_set_id,
                    block_left,
                    block_top,
                    tiles = placements.len(),
                    "Composited block"
                );
            }
        }

        outcome
    }
}

impl fmt::Debug for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compositor")
            .field("surface_size", &self.surface_size)
            .finish_non_exhaustive()
    }
}

/// Roles with at least one layer drawn at `zoom`.
fn drawn_roles(style: &dyn Style, zoom: f64) -> Vec<LayerRole> {
    let mut roles = Vec::with_capacity(2);
    for layer in style.layers() {
        if !layer.is_hidden(zoom) && !roles.contains(&layer.role) {
            roles.push(layer.role);
        }
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds_of(draws: &[DrawSpec]) -> SourceBounds {
        let mut bounds = SourceBounds {
            left: f64::INFINITY,
            top: f64::INFINITY,
            right: f64::NEG_INFINITY,
            bottom: f64::NEG_INFINITY,
        };
        for draw in draws {
            bounds.left = bounds.left.min(draw.src_left);
            bounds.top = bounds.top.min(draw.src_top);
            bounds.right = bounds.right.max(draw.src_right());
            bounds.bottom = bounds.bottom.max(draw.src_bottom());
        }
        bounds
    }

    #[test]
    fn test_blocks_cover_bounds_row_major() {
        let draws = [DrawSpec::new(0.0, 0.0, 1500.0, 1100.0, 0.0, 0.0)];
        assert_eq!(
            bounds_of(&draws).blocks(&draws, 1024.0),
            vec![(0.0, 0.0), (1024.0, 0.0), (0.0, 1024.0), (1024.0, 1024.0)]
        );
    }

    #[test]
    fn test_empty_draw_has_no_blocks() {
        let draws = [DrawSpec::new(10.0, 10.0, 0.0, 490.0, 0.0, 0.0)];
        assert!(bounds_of(&draws).blocks(&draws, 1024.0).is_empty());
    }

    #[test]
    fn test_distant_consumers_visit_only_their_blocks() {
        let draws = [
            DrawSpec::new(0.0, 0.0, 256.0, 256.0, 0.0, 0.0),
            DrawSpec::new(4_000_000.0, 4_000_000.0, 256.0, 256.0, 0.0, 0.0),
        ];
        let blocks = bounds_of(&draws).blocks(&draws, 1024.0);
        // 4_000_000 / 1024 = 3906.25, so the far draw sits in block 3906.
        assert_eq!(blocks, vec![(0.0, 0.0), (3906.0 * 1024.0, 3906.0 * 1024.0)]);
        for (left, top) in blocks {
            assert!(draws.iter().any(|d| d.overlaps_block(left, top, 1024.0)));
        }
    }

    #[test]
    fn test_shared_blocks_are_listed_once() {
        let draws = [
            DrawSpec::new(0.0, 0.0, 1100.0, 100.0, 0.0, 0.0),
            DrawSpec::new(900.0, 0.0, 300.0, 100.0, 0.0, 0.0),
        ];
        assert_eq!(
            bounds_of(&draws).blocks(&draws, 1024.0),
            vec![(0.0, 0.0), (1024.0, 0.0)]
        );
    }

    #[test]
    fn test_huge_coordinates_terminate() {
        let draws = [DrawSpec::new(1e20, 0.0, 256.0, 256.0, 0.0, 0.0)];
        // 1e20 + 256 rounds back to 1e20, leaving an empty span.
        assert!(bounds_of(&draws).blocks(&draws, 1024.0).is_empty());
    }

    #[test]
    fn test_blit_inside_single_block() {
        let draw = DrawSpec::new(100.0, 50.0, 200.0, 100.0, 10.0, 20.0);
        let blit = Blit::for_block(&draw, 0.0, 0.0, 1024.0);
        assert_eq!(blit.src, PixelRect::new(100, 50, 200, 100));
        assert_eq!((blit.dest_x, blit.dest_y), (10, 20));
    }

    #[test]
    fn test_blit_straddling_blocks() {
        // Source spans x in [1000, 1100) across the boundary at 1024.
        let draw = DrawSpec::new(1000.0, 0.0, 100.0, 10.0, 0.0, 0.0);

        let left = Blit::for_block(&draw, 0.0, 0.0, 1024.0);
        assert_eq!(left.src, PixelRect::new(1000, 0, 24, 10));
        assert_eq!((left.dest_x, left.dest_y), (0, 0));

        let right = Blit::for_block(&draw, 1024.0, 0.0, 1024.0);
        assert_eq!(right.src, PixelRect::new(0, 0, 76, 10));
        assert_eq!((right.dest_x, right.dest_y), (24, 0));
    }

    #[test]
    fn test_blit_truncates_fractional_coordinates() {
        let draw = DrawSpec::new(10.7, 5.2, 20.5, 10.9, 3.9, 1.1);
        let blit = Blit::for_block(&draw, 0.0, 0.0, 1024.0);
        assert_eq!(blit.src.x, 10);
        assert_eq!(blit.src.y, 5);
        assert_eq!(blit.src.width, 31 - 10);
        assert_eq!(blit.src.height, 16 - 5);
        assert_eq!((blit.dest_x, blit.dest_y), (3, 1));
    }
}
