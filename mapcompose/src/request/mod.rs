//! Render request model and canonicalization.
//!
//! A render request is a list of [`TileSpecEntry`] values placing source tiles
//! on an unbounded composition plane, plus a [`DrawSpec`] saying which
//! rectangle of that plane lands where on the caller's draw target.
//!
//! Requests that differ only by a uniform translation of every tile are the
//! same render as far as the coordinator is concerned. [`canonicalize`] moves
//! the tile set so its minimum `left`/`top` is zero (the draw spec absorbs the
//! offset) and [`identity_key`] turns the canonical tile list into a stable
//! [`TileSetId`].
//!
//! # Example
//!
//! ```
//! use mapcompose::request::{canonicalize, identity_key, DrawSpec, TileSpecEntry};
//!
//! let tiles = vec![TileSpecEntry::new("osm", 3, 4, 2, 512.0, 256.0, 256.0)];
//! let draw = DrawSpec::new(512.0, 256.0, 256.0, 256.0, 0.0, 0.0);
//!
//! let canonical = canonicalize(&tiles, &draw).unwrap();
//! assert_eq!(canonical.draw.src_left, 0.0);
//! assert_eq!(canonical.tiles[0].left, 0.0);
//!
//! let id = identity_key(&canonical.tiles);
//! assert!(id.as_str().contains("\"osm\""));
//! ```

mod canonical;
mod types;

pub use canonical::{canonicalize, identity_key, CanonicalRequest, TileSetId, MAX_COORDINATE};
pub use types::{DrawSpec, RenderRequest, RequestError, TileId, TileSpecEntry};
