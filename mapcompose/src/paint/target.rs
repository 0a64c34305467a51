//! Draw targets: the caller-owned sinks composites are copied into.

use std::sync::Arc;

use parking_lot::Mutex;
use tiny_skia::{
    BlendMode, Color, FilterQuality, IntRect, Paint, Pixmap, PixmapPaint, PixmapRef, Rect,
    Transform,
};

/// Integer pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// A sink that can clear a rectangle and receive a copy from the surface.
pub trait DrawTarget: Send {
    /// Make `rect` fully transparent.
    fn clear_rect(&mut self, rect: PixelRect);

    /// Copy `src` from `surface` so its top-left lands at `(dest_x, dest_y)`.
    fn copy_from(&mut self, surface: PixmapRef<'_>, src: PixelRect, dest_x: i32, dest_y: i32);
}

/// Draw target shared between a caller and the renderer.
pub type SharedDrawTarget = Arc<Mutex<dyn DrawTarget>>;

/// Draw target backed by a `tiny_skia::Pixmap`.
#[derive(Debug, Clone)]
pub struct PixmapTarget {
    pixmap: Pixmap,
}

impl PixmapTarget {
    /// Create a transparent target, or `None` for a zero or oversized extent.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Pixmap::new(width, height).map(|pixmap| Self { pixmap })
    }

    /// Wrap it for sharing with the renderer.
    pub fn shared(self) -> Arc<Mutex<PixmapTarget>> {
        Arc::new(Mutex::new(self))
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }
}

impl DrawTarget for PixmapTarget {
    fn clear_rect(&mut self, rect: PixelRect) {
        if rect.is_empty() {
            return;
        }
        let Some(area) = Rect::from_xywh(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color(Color::TRANSPARENT);
        paint.blend_mode = BlendMode::Clear;
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(area, &paint, Transform::identity(), None);
    }

    fn copy_from(&mut self, surface: PixmapRef<'_>, src: PixelRect, dest_x: i32, dest_y: i32) {
        if src.is_empty() {
            return;
        }
        let Some(rect) = IntRect::from_xywh(src.x, src.y, src.width as u32, src.height as u32)
        else {
            return;
        };
        let Some(region) = surface.clone_rect(rect) else {
            return;
        };
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: BlendMode::Source,
            quality: FilterQuality::Nearest,
        };
        self.pixmap.draw_pixmap(
            dest_x,
            dest_y,
            region.as_ref(),
            &paint,
            Transform::identity(),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::PremultipliedColorU8;

    fn opaque(pixmap: &Pixmap, x: u32, y: u32) -> bool {
        pixmap.pixel(x, y).map(|p| p.alpha() == 255).unwrap_or(false)
    }

    fn red_surface(size: u32) -> Pixmap {
        let mut surface = Pixmap::new(size, size).unwrap();
        surface.fill(Color::from_rgba8(255, 0, 0, 255));
        surface
    }

    #[test]
    fn test_copy_places_region_at_destination() {
        let surface = red_surface(64);
        let mut target = PixmapTarget::new(100, 100).unwrap();

        target.copy_from(surface.as_ref(), PixelRect::new(8, 8, 16, 16), 50, 60);

        assert!(opaque(target.pixmap(), 50, 60));
        assert!(opaque(target.pixmap(), 65, 75));
        assert!(!opaque(target.pixmap(), 66, 76));
        assert!(!opaque(target.pixmap(), 49, 60));
    }

    #[test]
    fn test_copy_clipped_at_target_edge() {
        let surface = red_surface(64);
        let mut target = PixmapTarget::new(32, 32).unwrap();
        target.copy_from(surface.as_ref(), PixelRect::new(0, 0, 64, 64), 16, 16);
        assert!(opaque(target.pixmap(), 31, 31));
        assert!(!opaque(target.pixmap(), 15, 15));
    }

    #[test]
    fn test_clear_rect_makes_pixels_transparent() {
        let mut target = PixmapTarget::new(20, 20).unwrap();
        target.pixmap_mut().fill(Color::from_rgba8(0, 0, 255, 255));

        target.clear_rect(PixelRect::new(5, 5, 10, 10));

        assert_eq!(
            target.pixmap().pixel(7, 7),
            PremultipliedColorU8::from_rgba(0, 0, 0, 0)
        );
        assert!(opaque(target.pixmap(), 4, 4));
        assert!(opaque(target.pixmap(), 15, 15));
    }

    #[test]
    fn test_empty_rects_are_ignored() {
        let surface = red_surface(8);
        let mut target = PixmapTarget::new(8, 8).unwrap();
        target.copy_from(surface.as_ref(), PixelRect::new(0, 0, 0, 4), 0, 0);
        target.clear_rect(PixelRect::new(0, 0, 4, -1));
        assert!(!opaque(target.pixmap(), 0, 0));
    }

    #[test]
    fn test_shared_target_coerces_to_dyn() {
        let target = PixmapTarget::new(4, 4).unwrap().shared();
        let shared: SharedDrawTarget = target.clone();
        shared.lock().clear_rect(PixelRect::new(0, 0, 4, 4));
        assert_eq!(target.lock().pixmap().width(), 4);
    }
}
