//! Tile handles, source cache contract, and the lifecycle adapter.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐     acquire(entry, role)     ┌──────────────────┐
//! │  PendingRenderStore  │ ───────────────────────────► │ TileLifecycle    │
//! │                      │ ◄─────────────────────────── │ Adapter          │
//! └──────────────────────┘        TileHandle            └────────┬─────────┘
//!                                                                 │ (role, source)
//!                                                                 ▼
//!                                              ┌──────────────────────────────┐
//!                                              │ Arc<dyn SourceCache>         │
//!                                              │  "symbol:osm", "other:osm"   │
//!                                              └──────────────────────────────┘
//! ```

mod handle;
mod lifecycle;
mod source_cache;

pub use handle::{TileHandle, TileLoadSignal, TileLoadState};
pub use lifecycle::TileLifecycleAdapter;
pub use source_cache::{RenderingTile, SourceCache, SourceCacheKey, SourceCacheSet};
