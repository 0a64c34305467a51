//! Source cache contract.
//!
//! Each style source is backed by one cache per layer role, because symbol
//! layers and geometry layers may need independently cached tile instances.
//! The coordinator never loads tiles itself: it asks the cache selected by
//! [`SourceCacheKey`] for a [`TileHandle`] and waits on its load signal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::handle::TileHandle;
use crate::request::TileId;
use crate::style::LayerRole;

/// Selects a source cache: one per `(role, source)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceCacheKey {
    pub role: LayerRole,
    pub source: String,
}

impl SourceCacheKey {
    /// Create a cache key.
    pub fn new(role: LayerRole, source: impl Into<String>) -> Self {
        Self {
            role,
            source: source.into(),
        }
    }
}

impl fmt::Display for SourceCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role.prefix(), self.source)
    }
}

/// A loaded tile placed for the current paint pass.
#[derive(Debug, Clone)]
pub struct RenderingTile {
    pub handle: TileHandle,
    pub left: f64,
    pub top: f64,
    pub size: f64,
}

/// Tile cache for one `(role, source)` pair.
///
/// # Usage counting
///
/// `acquire_tile` retains the returned handle once; every
/// [`TileHandle::retain`] made by the coordinator for an extra consumer is
/// balanced by exactly one `release_tile`. When and whether a tile is freed
/// after its count reaches zero is up to the cache.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; the coordinator calls into
/// caches from whichever runtime worker is driving a render.
pub trait SourceCache: Send + Sync {
    /// Acquire a handle for `tile` at the given size.
    ///
    /// Load failures are reported through the handle's load signal, never
    /// by this call.
    fn acquire_tile(&self, tile: &TileId, size: f64) -> TileHandle;

    /// Give back one use of `handle`.
    fn release_tile(&self, handle: &TileHandle);

    /// Forget every tile considered loaded so the next acquire reloads it.
    fn invalidate_all_loaded_tiles(&self);

    /// Replace the list of tiles relevant to the current paint pass.
    fn set_currently_rendering(&self, tiles: Vec<RenderingTile>);
}

/// All source caches known to a renderer, keyed by role and source.
#[derive(Clone, Default)]
pub struct SourceCacheSet {
    caches: HashMap<SourceCacheKey, Arc<dyn SourceCache>>,
}

impl SourceCacheSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cache` for `(role, source)`, replacing any previous one.
    pub fn insert(
        &mut self,
        role: LayerRole,
        source: impl Into<String>,
        cache: Arc<dyn SourceCache>,
    ) -> Option<Arc<dyn SourceCache>> {
        self.caches.insert(SourceCacheKey::new(role, source), cache)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_cache(
        mut self,
        role: LayerRole,
        source: impl Into<String>,
        cache: Arc<dyn SourceCache>,
    ) -> Self {
        self.insert(role, source, cache);
        self
    }

    /// Look up the cache for a key.
    pub fn get(&self, key: &SourceCacheKey) -> Option<&Arc<dyn SourceCache>> {
        self.caches.get(key)
    }

    /// Iterate over every registered cache.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceCacheKey, &Arc<dyn SourceCache>)> {
        self.caches.iter()
    }

    /// Sources that have a cache for `role`, sorted.
    pub fn sources(&self, role: LayerRole) -> Vec<String> {
        let mut sources: Vec<String> = self
            .caches
            .keys()
            .filter(|k| k.role == role)
            .map(|k| k.source.clone())
            .collect();
        sources.sort();
        sources
    }

    /// Number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Whether no cache is registered.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl fmt::Debug for SourceCacheSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.caches.keys().map(|k| k.to_string()).collect();
        keys.sort();
        f.debug_struct("SourceCacheSet").field("caches", &keys).finish()
    }
}
