//! Translation-invariant canonical form and tile set identity.

use std::fmt;

use super::types::{DrawSpec, RequestError, TileSpecEntry};

/// Largest magnitude a canonical coordinate may have.
///
/// Blits address target pixels with `i32`.
pub const MAX_COORDINATE: f64 = i32::MAX as f64;

/// Stable identity of a canonical tile set.
///
/// Built from the sorted per-entry strings, so it does not depend on the
/// order entries were supplied in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileSetId(String);

impl TileSetId {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request moved so that its minimum tile `left`/`top` sit at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    pub tiles: Vec<TileSpecEntry>,
    pub draw: DrawSpec,
}

/// Canonicalize a tile set and draw spec.
///
/// Subtracts the minimum `left` and `top` over all entries from every entry
/// and from the draw spec's source origin. Destination coordinates and
/// extents are left untouched.
///
/// # Errors
///
/// Returns [`RequestError`] for an empty tile list, a non-finite coordinate,
/// a negative draw extent, or a canonical coordinate beyond
/// [`MAX_COORDINATE`].
pub fn canonicalize(
    tiles: &[TileSpecEntry],
    draw: &DrawSpec,
) -> Result<CanonicalRequest, RequestError> {
    if tiles.is_empty() {
        return Err(RequestError::EmptyTileSet);
    }
    validate(tiles, draw)?;

    let min_left = tiles.iter().map(|t| t.left).fold(f64::INFINITY, f64::min);
    let min_top = tiles.iter().map(|t| t.top).fold(f64::INFINITY, f64::min);

    let canonical = CanonicalRequest {
        tiles: tiles
            .iter()
            .map(|t| t.translated(min_left, min_top))
            .collect(),
        draw: DrawSpec {
            src_left: draw.src_left - min_left,
            src_top: draw.src_top - min_top,
            ..*draw
        },
    };
    check_ranges(&canonical)?;
    Ok(canonical)
}

/// Compute the identity key of an (already canonical) tile list.
///
/// The source name is written with `{:?}` so quotes and separators inside a
/// name cannot make two different sets print the same.
pub fn identity_key(tiles: &[TileSpecEntry]) -> TileSetId {
    let mut parts: Vec<String> = tiles
        .iter()
        .map(|t| {
            format!(
                "{:?} {} {} {} {} {} {}",
                t.source, t.zoom, t.x, t.y, t.left, t.top, t.size
            )
        })
        .collect();
    parts.sort();
    TileSetId(parts.join(" "))
}

fn validate(tiles: &[TileSpecEntry], draw: &DrawSpec) -> Result<(), RequestError> {
    for t in tiles {
        check_finite("left", t.left)?;
        check_finite("top", t.top)?;
        check_finite("size", t.size)?;
    }
    check_finite("src_left", draw.src_left)?;
    check_finite("src_top", draw.src_top)?;
    check_finite("width", draw.width)?;
    check_finite("height", draw.height)?;
    check_finite("dest_left", draw.dest_left)?;
    check_finite("dest_top", draw.dest_top)?;

    if draw.width < 0.0 || draw.height < 0.0 {
        return Err(RequestError::NegativeExtent {
            width: draw.width,
            height: draw.height,
        });
    }
    Ok(())
}

fn check_ranges(canonical: &CanonicalRequest) -> Result<(), RequestError> {
    for t in &canonical.tiles {
        check_range("left", t.left)?;
        check_range("top", t.top)?;
        check_range("size", t.left + t.size)?;
        check_range("size", t.top + t.size)?;
    }
    let draw = &canonical.draw;
    check_range("src_left", draw.src_left)?;
    check_range("src_top", draw.src_top)?;
    check_range("width", draw.src_right())?;
    check_range("height", draw.src_bottom())?;
    check_range("dest_left", draw.dest_left)?;
    check_range("dest_top", draw.dest_top)?;
    check_range("width", draw.dest_left + draw.width)?;
    check_range("height", draw.dest_top + draw.height)
}

fn check_range(field: &'static str, value: f64) -> Result<(), RequestError> {
    if value.abs() <= MAX_COORDINATE {
        Ok(())
    } else {
        Err(RequestError::OutOfRange { field })
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), RequestError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RequestError::NonFinite { field })
    }
}
