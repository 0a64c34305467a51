//! In-memory source cache.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::request::TileId;
use crate::style::LayerRole;
use crate::tile::{RenderingTile, SourceCache, SourceCacheKey, TileHandle, TileLoadSignal};

struct CachedTile {
    handle: TileHandle,
    signal: TileLoadSignal,
}

#[derive(Default)]
struct CacheState {
    tiles: HashMap<TileId, CachedTile>,
    failing: HashSet<TileId>,
    currently_rendering: Vec<RenderingTile>,
    acquires: usize,
    releases: usize,
    freed: usize,
    invalidations: usize,
}

/// Source cache that keeps tiles in a map and lets the caller decide when
/// they load.
///
/// One handle exists per tile id while it has users; acquiring an id that
/// is already cached retains the existing handle. A handle whose usage count
/// drops to zero is freed.
///
/// In auto-load mode tiles are loaded as soon as they are acquired; tiles
/// registered with [`fail_on`](Self::fail_on) always fail.
pub struct MemorySourceCache {
    key: SourceCacheKey,
    auto_load: bool,
    state: Mutex<CacheState>,
}

impl MemorySourceCache {
    /// A cache whose tiles stay pending until settled explicitly.
    pub fn new(role: LayerRole, source: impl Into<String>) -> Self {
        Self {
            key: SourceCacheKey::new(role, source),
            auto_load: false,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// A cache that loads every tile on acquisition.
    pub fn with_auto_load(role: LayerRole, source: impl Into<String>) -> Self {
        Self {
            auto_load: true,
            ..Self::new(role, source)
        }
    }

    pub fn key(&self) -> &SourceCacheKey {
        &self.key
    }

    /// Make `tile` fail now and on every future acquisition.
    pub fn fail_on(&self, tile: TileId) {
        let mut state = self.state.lock();
        if let Some(cached) = state.tiles.get(&tile) {
            if !cached.signal.state().is_settled() {
                cached.signal.fail("tile marked as failing");
            }
        }
        state.failing.insert(tile);
    }

    /// Mark a cached tile loaded. Returns `false` if it is not cached.
    pub fn load_tile(&self, tile: &TileId) -> bool {
        let state = self.state.lock();
        match state.tiles.get(tile) {
            Some(cached) => {
                cached.signal.load();
                true
            }
            None => false,
        }
    }

    /// Mark a cached tile failed. Returns `false` if it is not cached.
    pub fn fail_tile(&self, tile: &TileId, reason: &str) -> bool {
        let state = self.state.lock();
        match state.tiles.get(tile) {
            Some(cached) => {
                cached.signal.fail(reason);
                true
            }
            None => false,
        }
    }

    /// Load every pending tile, returning how many were settled.
    pub fn load_all_pending(&self) -> usize {
        let state = self.state.lock();
        let mut settled = 0;
        for cached in state.tiles.values() {
            if !cached.signal.state().is_settled() {
                cached.signal.load();
                settled += 1;
            }
        }
        settled
    }

    /// Number of `acquire_tile` calls.
    pub fn acquire_count(&self) -> usize {
        self.state.lock().acquires
    }

    /// Number of `release_tile` calls.
    pub fn release_count(&self) -> usize {
        self.state.lock().releases
    }

    /// Number of handles freed after their last use was released.
    pub fn freed_count(&self) -> usize {
        self.state.lock().freed
    }

    /// Number of `invalidate_all_loaded_tiles` calls.
    pub fn invalidation_count(&self) -> usize {
        self.state.lock().invalidations
    }

    /// Number of cached handles.
    pub fn live_tile_count(&self) -> usize {
        self.state.lock().tiles.len()
    }

    /// Current uses of the cached handle for `tile`, 0 if absent.
    pub fn uses(&self, tile: &TileId) -> usize {
        self.state
            .lock()
            .tiles
            .get(tile)
            .map_or(0, |cached| cached.handle.uses())
    }

    /// Snapshot of the currently-rendering list.
    pub fn currently_rendering(&self) -> Vec<RenderingTile> {
        self.state.lock().currently_rendering.clone()
    }
}

impl SourceCache for MemorySourceCache {
    fn acquire_tile(&self, tile: &TileId, size: f64) -> TileHandle {
        let mut state = self.state.lock();
        state.acquires += 1;

        if let Some(cached) = state.tiles.get(tile) {
            cached.handle.retain();
            trace!(cache = %self.key, %tile, uses = cached.handle.uses(), "Retained cached tile");
            return cached.handle.clone();
        }

        let (handle, signal) = TileHandle::new(tile.clone(), size, Some(self.key.clone()));
        handle.retain();
        if state.failing.contains(tile) {
            signal.fail("tile marked as failing");
        } else if self.auto_load {
            signal.load();
        }
        state.tiles.insert(
            tile.clone(),
            CachedTile {
                handle: handle.clone(),
                signal,
            },
        );
        trace!(cache = %self.key, %tile, "Cached new tile");
        handle
    }

    fn release_tile(&self, handle: &TileHandle) {
        let mut state = self.state.lock();
        state.releases += 1;
        if handle.release_use() > 0 {
            return;
        }
        let is_cached = state
            .tiles
            .get(handle.tile())
            .is_some_and(|cached| cached.handle.id() == handle.id());
        if is_cached {
            state.tiles.remove(handle.tile());
            state.freed += 1;
            trace!(cache = %self.key, tile = %handle.tile(), "Freed tile");
        }
    }

    fn invalidate_all_loaded_tiles(&self) {
        let mut state = self.state.lock();
        state.invalidations += 1;
        let before = state.tiles.len();
        state
            .tiles
            .retain(|_, cached| !cached.handle.state().is_loaded());
        debug!(
            cache = %self.key,
            dropped = before - state.tiles.len(),
            "Invalidated loaded tiles"
        );
    }

    fn set_currently_rendering(&self, tiles: Vec<RenderingTile>) {
        self.state.lock().currently_rendering = tiles;
    }
}

impl fmt::Debug for MemorySourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySourceCache")
            .field("key", &self.key)
            .field("auto_load", &self.auto_load)
            .field("tiles", &self.state.lock().tiles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileLoadState;

    fn tile(x: u32) -> TileId {
        TileId::new("osm", 3, x, 1)
    }

    #[test]
    fn test_acquire_dedups_by_tile_id() {
        let cache = MemorySourceCache::new(LayerRole::Other, "osm");
        let a = cache.acquire_tile(&tile(1), 256.0);
        let b = cache.acquire_tile(&tile(1), 256.0);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.uses(), 2);
        assert_eq!(cache.live_tile_count(), 1);
        assert_eq!(cache.acquire_count(), 2);
    }

    #[test]
    fn test_last_release_frees() {
        let cache = MemorySourceCache::new(LayerRole::Other, "osm");
        let handle = cache.acquire_tile(&tile(1), 256.0);
        cache.acquire_tile(&tile(1), 256.0);

        cache.release_tile(&handle);
        assert_eq!(cache.freed_count(), 0);
        assert_eq!(cache.uses(&tile(1)), 1);

        cache.release_tile(&handle);
        assert_eq!(cache.freed_count(), 1);
        assert_eq!(cache.live_tile_count(), 0);
    }

    #[test]
    fn test_load_and_fail_signals() {
        let cache = MemorySourceCache::new(LayerRole::Symbol, "osm");
        let a = cache.acquire_tile(&tile(1), 256.0);
        let b = cache.acquire_tile(&tile(2), 256.0);
        assert_eq!(a.state(), TileLoadState::Pending);

        assert!(cache.load_tile(&tile(1)));
        assert!(cache.fail_tile(&tile(2), "404"));
        assert!(!cache.load_tile(&tile(9)));

        assert!(a.state().is_loaded());
        assert_eq!(b.state(), TileLoadState::Failed("404".into()));
        assert_eq!(cache.load_all_pending(), 0);
    }

    #[test]
    fn test_auto_load_and_fail_on() {
        let cache = MemorySourceCache::with_auto_load(LayerRole::Other, "osm");
        cache.fail_on(tile(2));
        assert!(cache.acquire_tile(&tile(1), 256.0).state().is_loaded());
        assert!(matches!(
            cache.acquire_tile(&tile(2), 256.0).state(),
            TileLoadState::Failed(_)
        ));
    }

    #[test]
    fn test_invalidate_drops_only_loaded_tiles() {
        let cache = MemorySourceCache::new(LayerRole::Other, "osm");
        let loaded = cache.acquire_tile(&tile(1), 256.0);
        cache.acquire_tile(&tile(2), 256.0);
        cache.load_tile(&tile(1));

        cache.invalidate_all_loaded_tiles();
        assert_eq!(cache.live_tile_count(), 1);
        assert_eq!(cache.invalidation_count(), 1);

        // A fresh acquire gets a new handle; releasing the old one frees nothing.
        let fresh = cache.acquire_tile(&tile(1), 256.0);
        assert_ne!(fresh.id(), loaded.id());
        cache.release_tile(&loaded);
        assert_eq!(cache.freed_count(), 0);
        assert_eq!(cache.live_tile_count(), 2);
    }
}
