//! Render CLI command.
//!
//! Composites one render request with the in-memory collaborators and
//! writes the draw target as an image:
//!
//! ```text
//! mapcompose render --tile osm/1/0/0@0,0,256 --tile osm/1/1/0@256,0,256 -o out.png
//! mapcompose render --request request.json --style style.json -o out.png
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use image::RgbaImage;
use mapcompose::paint::{PixmapTarget, SharedDrawTarget};
use mapcompose::request::TileId;
use mapcompose::standalone::{FillPainter, MemorySourceCache, StaticStyle};
use mapcompose::style::{roles_in_order, LayerRole, Style, StyleLayer};
use mapcompose::tile::SourceCacheSet;
use mapcompose::{
    DrawSpec, RenderError, RenderRequest, Renderer, RendererConfig, RendererParts, TileSpecEntry,
};
use tracing::{info, warn};

use super::args::{parse_tile_entry, parse_tile_id};
use crate::error::CliError;

/// Arguments for `mapcompose render`.
#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Tile to composite, as source/z/x/y@left,top,size (repeatable)
    #[arg(
        long = "tile",
        value_name = "TILE",
        value_parser = parse_tile_entry,
        allow_hyphen_values = true,
        required_unless_present = "request"
    )]
    pub tiles: Vec<TileSpecEntry>,

    /// JSON render request with `tiles` and `draw`
    #[arg(long, value_name = "FILE", conflicts_with = "tiles")]
    pub request: Option<PathBuf>,

    /// Left edge of the rendered rectangle on the composition plane
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub src_left: f64,

    /// Top edge of the rendered rectangle on the composition plane
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub src_top: f64,

    /// Output width in pixels (defaults to the tiles' right edge)
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels (defaults to the tiles' bottom edge)
    #[arg(long)]
    pub height: Option<u32>,

    /// Make a tile fail to load, as source/z/x/y (repeatable)
    #[arg(long = "fail", value_name = "TILE", value_parser = parse_tile_id)]
    pub fail: Vec<TileId>,

    /// Style document; defaults to one fill layer per source
    #[arg(long, value_name = "FILE")]
    pub style: Option<PathBuf>,

    /// Override the configured filter zoom
    #[arg(long)]
    pub filter_zoom: Option<f64>,

    /// Output image path
    #[arg(short, long, default_value = "render.png")]
    pub output: PathBuf,
}

impl RenderArgs {
    /// The request to render, from `--request` or the tile arguments.
    fn build_request(&self) -> Result<RenderRequest, CliError> {
        if let Some(path) = &self.request {
            let text = std::fs::read_to_string(path)?;
            return Ok(RenderRequest::from_json(&text)?);
        }

        let right = self
            .tiles
            .iter()
            .map(|t| t.left + t.size)
            .fold(f64::NEG_INFINITY, f64::max);
        let bottom = self
            .tiles
            .iter()
            .map(|t| t.top + t.size)
            .fold(f64::NEG_INFINITY, f64::max);

        let width = match self.width {
            Some(w) => f64::from(w),
            None => (right - self.src_left).ceil(),
        };
        let height = match self.height {
            Some(h) => f64::from(h),
            None => (bottom - self.src_top).ceil(),
        };
        if !(width >= 1.0 && height >= 1.0) {
            return Err(CliError::Argument(format!(
                "rendered area {}x{} is empty",
                width, height
            )));
        }

        Ok(RenderRequest {
            tiles: self.tiles.clone(),
            draw: DrawSpec::new(self.src_left, self.src_top, width, height, 0.0, 0.0),
        })
    }
}

/// Run the render command.
pub fn run(args: RenderArgs, config: &RendererConfig) -> Result<(), CliError> {
    let request = args.build_request()?;
    let style = load_style(args.style.as_deref(), &request.tiles)?;

    let mut config = config.clone();
    if let Some(filter_zoom) = args.filter_zoom {
        config.filter_zoom = filter_zoom;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let target = runtime.block_on(render(config, style, &request, &args.fail))?;

    let image = to_image(&target)?;
    image.save(&args.output)?;
    println!(
        "Wrote {}x{} image to {}",
        image.width(),
        image.height(),
        args.output.display()
    );
    Ok(())
}

/// Composite `request` into a fresh target sized to its destination.
async fn render(
    config: RendererConfig,
    style: Arc<StaticStyle>,
    request: &RenderRequest,
    fail: &[TileId],
) -> Result<PixmapTarget, CliError> {
    let draw = request.draw;
    let target_width = (draw.dest_left + draw.width).ceil().max(1.0) as u32;
    let target_height = (draw.dest_top + draw.height).ceil().max(1.0) as u32;
    let target = PixmapTarget::new(target_width, target_height)
        .ok_or_else(|| {
            CliError::Argument(format!(
                "cannot allocate a {}x{} target",
                target_width, target_height
            ))
        })?
        .shared();

    let caches = build_caches(&style.layers(), &request.tiles, fail);
    let parts = RendererParts {
        style,
        painter: Box::new(FillPainter::new()),
        caches,
    };
    let renderer = Renderer::new(config, parts)?;

    let shared: SharedDrawTarget = target.clone();
    let (token, completion) = renderer.submit_render(shared, &draw, &request.tiles)?;
    let outcome = completion.await;
    renderer.release_render(token);
    renderer.shutdown();
    drop(renderer);

    match outcome {
        Ok(()) => info!(tiles = request.tiles.len(), "Render complete"),
        Err(e @ RenderError::PartialTileFailure { .. }) => warn!(error = %e, "Render incomplete"),
        Err(e @ RenderError::TotalTileFailure { .. }) => warn!(error = %e, "Render empty"),
        Err(e) => return Err(e.into()),
    }

    let pixmap = target.lock().clone();
    Ok(pixmap)
}

/// The style from `path`, or one fill layer per source in `tiles`.
fn load_style(path: Option<&Path>, tiles: &[TileSpecEntry]) -> Result<Arc<StaticStyle>, CliError> {
    if let Some(path) = path {
        let text = std::fs::read_to_string(path)?;
        return Ok(Arc::new(StaticStyle::from_json(&text)?));
    }

    let layers = sources_of(tiles)
        .into_iter()
        .map(|source| {
            StyleLayer::new(format!("{}-fill", source), LayerRole::Other, Some(source))
        })
        .collect();
    Ok(Arc::new(StaticStyle::ready(layers)))
}

/// One auto-loading cache per role in the style and source in the request.
fn build_caches(layers: &[StyleLayer], tiles: &[TileSpecEntry], fail: &[TileId]) -> SourceCacheSet {
    let mut caches = SourceCacheSet::new();
    for role in roles_in_order(layers) {
        for source in sources_of(tiles) {
            let cache = MemorySourceCache::with_auto_load(role, source);
            for tile in fail.iter().filter(|t| t.source == source) {
                cache.fail_on(tile.clone());
            }
            caches.insert(role, source, Arc::new(cache));
        }
    }
    caches
}

fn sources_of(tiles: &[TileSpecEntry]) -> BTreeSet<&str> {
    tiles.iter().map(|t| t.source.as_str()).collect()
}

/// Convert the premultiplied target pixels into a straight-alpha image.
fn to_image(target: &PixmapTarget) -> Result<RgbaImage, CliError> {
    let pixmap = target.pixmap();
    let mut raw = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        raw.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .ok_or_else(|| CliError::Argument("target pixel buffer has the wrong size".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RenderArgs,
    }

    fn parse(argv: &[&str]) -> RenderArgs {
        let mut full = vec!["mapcompose"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_request_defaults_to_tile_bounds() {
        let args = parse(&[
            "--tile",
            "osm/1/0/0@0,0,256",
            "--tile",
            "osm/1/1/0@256,0,256",
        ]);
        let request = args.build_request().unwrap();
        assert_eq!(request.tiles.len(), 2);
        assert_eq!(request.draw, DrawSpec::new(0.0, 0.0, 512.0, 256.0, 0.0, 0.0));
    }

    #[test]
    fn test_request_with_explicit_window() {
        let args = parse(&[
            "--tile",
            "osm/1/0/0@-128,0,256",
            "--src-left",
            "-64",
            "--width",
            "100",
            "--height",
            "50",
        ]);
        let request = args.build_request().unwrap();
        assert_eq!(request.draw, DrawSpec::new(-64.0, 0.0, 100.0, 50.0, 0.0, 0.0));
    }

    #[test]
    fn test_tile_or_request_required() {
        assert!(TestCli::try_parse_from(["mapcompose"]).is_err());
        assert!(TestCli::try_parse_from([
            "mapcompose",
            "--tile",
            "osm/1/0/0@0,0,256",
            "--request",
            "r.json",
        ])
        .is_err());
    }

    #[test]
    fn test_default_style_has_one_layer_per_source() {
        let tiles = vec![
            TileSpecEntry::new("b", 1, 0, 0, 0.0, 0.0, 256.0),
            TileSpecEntry::new("a", 1, 0, 0, 0.0, 0.0, 256.0),
            TileSpecEntry::new("a", 1, 1, 0, 256.0, 0.0, 256.0),
        ];
        let style = load_style(None, &tiles).unwrap();
        let ids: Vec<String> = style.layers().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["a-fill", "b-fill"]);

        let caches = build_caches(&style.layers(), &tiles, &[]);
        assert_eq!(caches.sources(LayerRole::Other), vec!["a", "b"]);
        assert!(caches.sources(LayerRole::Symbol).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_render_writes_tile_colors() {
        let tiles = vec![
            TileSpecEntry::new("osm", 1, 0, 0, 0.0, 0.0, 16.0),
            TileSpecEntry::new("osm", 1, 1, 0, 16.0, 0.0, 16.0),
        ];
        let request = RenderRequest {
            tiles: tiles.clone(),
            draw: DrawSpec::new(0.0, 0.0, 32.0, 16.0, 0.0, 0.0),
        };
        let style = load_style(None, &tiles).unwrap();
        let target = render(RendererConfig::default(), style, &request, &[])
            .await
            .unwrap();

        let image = to_image(&target).unwrap();
        assert_eq!(image.dimensions(), (32, 16));
        let left = FillPainter::color_for(&TileId::new("osm", 1, 0, 0)).to_color_u8();
        let pixel = image.get_pixel(4, 4);
        assert_eq!(pixel.0, [left.red(), left.green(), left.blue(), 255]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_render_tolerates_partial_failure() {
        let tiles = vec![
            TileSpecEntry::new("osm", 1, 0, 0, 0.0, 0.0, 16.0),
            TileSpecEntry::new("osm", 1, 1, 0, 16.0, 0.0, 16.0),
        ];
        let request = RenderRequest {
            tiles: tiles.clone(),
            draw: DrawSpec::new(0.0, 0.0, 32.0, 16.0, 0.0, 0.0),
        };
        let style = load_style(None, &tiles).unwrap();
        let fail = vec![TileId::new("osm", 1, 1, 0)];
        let target = render(RendererConfig::default(), style, &request, &fail)
            .await
            .unwrap();

        let image = to_image(&target).unwrap();
        assert_eq!(image.get_pixel(4, 4).0[3], 255);
    }
}
