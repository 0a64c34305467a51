//! Painter and draw target contracts.
//!
//! The offscreen surface is a fixed-size `tiny_skia::Pixmap` owned by the
//! compositor. A [`Painter`] fills it once per block; the compositor then
//! copies sub-rectangles into each consumer's [`DrawTarget`].

mod painter;
mod target;

pub use painter::{PaintPass, Painter, PosMatrix, TilePlacement, TILE_EXTENT};
pub use target::{DrawTarget, PixelRect, PixmapTarget, SharedDrawTarget};
