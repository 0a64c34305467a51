//! Routes tile acquisition and release to the owning source cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::handle::TileHandle;
use super::source_cache::{RenderingTile, SourceCacheKey, SourceCacheSet};
use crate::request::TileSpecEntry;
use crate::style::LayerRole;

/// Thin adapter between the pending-render registry and the source caches.
///
/// Holds no tile state of its own; load state and freeing belong to the
/// caches.
#[derive(Debug, Clone)]
pub struct TileLifecycleAdapter {
    caches: Arc<SourceCacheSet>,
}

impl TileLifecycleAdapter {
    /// Create an adapter over a set of caches.
    pub fn new(caches: Arc<SourceCacheSet>) -> Self {
        Self { caches }
    }

    /// The caches this adapter routes to.
    pub fn caches(&self) -> &SourceCacheSet {
        &self.caches
    }

    /// Acquire the tile for `entry` from the cache serving `role`.
    ///
    /// A missing cache yields an already-failed handle, so the render
    /// degrades to a partial failure instead of erroring.
    pub fn acquire(&self, entry: &TileSpecEntry, role: LayerRole) -> TileHandle {
        let key = SourceCacheKey::new(role, entry.source.clone());
        match self.caches.get(&key) {
            Some(cache) => cache.acquire_tile(&entry.tile_id(), entry.size),
            None => {
                warn!(cache = %key, tile = %entry.tile_id(), "No source cache for tile");
                TileHandle::failed(
                    entry.tile_id(),
                    entry.size,
                    format!("no source cache '{}'", key),
                )
            }
        }
    }

    /// Give one use of `handle` back to its cache.
    pub fn release(&self, handle: &TileHandle) {
        let Some(key) = handle.cache_key() else {
            return;
        };
        match self.caches.get(key) {
            Some(cache) => cache.release_tile(handle),
            None => debug!(cache = %key, "Released tile from unknown cache"),
        }
    }

    /// Ask every cache to drop its loaded tiles.
    pub fn invalidate_all(&self) {
        for (_, cache) in self.caches.iter() {
            cache.invalidate_all_loaded_tiles();
        }
    }

    /// Publish the tiles relevant to the next paint passes.
    ///
    /// Every cache is reset; caches absent from `groups` get an empty list.
    pub fn set_currently_rendering(&self, mut groups: HashMap<SourceCacheKey, Vec<RenderingTile>>) {
        for (key, cache) in self.caches.iter() {
            cache.set_currently_rendering(groups.remove(key).unwrap_or_default());
        }
    }

    /// Empty every cache's currently-rendering list.
    pub fn clear_currently_rendering(&self) {
        for (_, cache) in self.caches.iter() {
            cache.set_currently_rendering(Vec::new());
        }
    }
}
