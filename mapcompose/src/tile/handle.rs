//! Tile handles and their load signal.
//!
//! A [`TileHandle`] is what a source cache hands out on acquisition. The
//! coordinator only reads two things from it: a usage counter and a load
//! signal. The cache keeps the paired [`TileLoadSignal`] and settles it once
//! the tile has loaded or failed.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::source_cache::SourceCacheKey;
use crate::request::TileId;

// =============================================================================
// Handle Id Generator
// =============================================================================

/// Global counter so every handle ever created has a distinct id.
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_handle_id() -> u64 {
    HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Load State
// =============================================================================

/// Load state published through a tile's load signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileLoadState {
    /// Still being fetched or decoded.
    Pending,
    /// Data is available for painting.
    Loaded,
    /// The tile could not be loaded.
    Failed(String),
}

impl TileLoadState {
    /// Loaded or failed.
    pub fn is_settled(&self) -> bool {
        !matches!(self, TileLoadState::Pending)
    }

    /// Whether the tile can be painted.
    pub fn is_loaded(&self) -> bool {
        matches!(self, TileLoadState::Loaded)
    }
}

// =============================================================================
// Tile Handle
// =============================================================================

struct TileHandleInner {
    id: u64,
    tile: TileId,
    size: f64,
    cache_key: Option<SourceCacheKey>,
    uses: AtomicUsize,
    state: watch::Receiver<TileLoadState>,
}

/// Shared handle to a tile owned by a source cache.
///
/// Cloning is cheap and does not touch the usage counter; use
/// [`retain`](Self::retain) and [`release_use`](Self::release_use) for that.
#[derive(Clone)]
pub struct TileHandle {
    inner: Arc<TileHandleInner>,
}

impl TileHandle {
    /// Create a pending handle and the signal used to settle it.
    ///
    /// The usage counter starts at zero; the creating cache is expected to
    /// [`retain`](Self::retain) it for the acquisition it is serving.
    pub fn new(
        tile: TileId,
        size: f64,
        cache_key: Option<SourceCacheKey>,
    ) -> (TileHandle, TileLoadSignal) {
        let (tx, rx) = watch::channel(TileLoadState::Pending);
        let handle = TileHandle {
            inner: Arc::new(TileHandleInner {
                id: next_handle_id(),
                tile,
                size,
                cache_key,
                uses: AtomicUsize::new(0),
                state: rx,
            }),
        };
        (handle, TileLoadSignal { tx })
    }

    /// A handle that has already failed and belongs to no cache.
    pub fn failed(tile: TileId, size: f64, reason: impl Into<String>) -> TileHandle {
        let (handle, signal) = TileHandle::new(tile, size, None);
        signal.fail(reason);
        handle
    }

    /// Unique id of this handle instance.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The tile this handle refers to.
    pub fn tile(&self) -> &TileId {
        &self.inner.tile
    }

    /// Size the tile was requested at.
    pub fn size(&self) -> f64 {
        self.inner.size
    }

    /// Key of the cache that owns this handle, if any.
    pub fn cache_key(&self) -> Option<&SourceCacheKey> {
        self.inner.cache_key.as_ref()
    }

    /// Increment the usage counter, returning the new count.
    pub fn retain(&self) -> usize {
        self.inner.uses.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the usage counter, returning the remaining count.
    ///
    /// Saturates at zero.
    pub fn release_use(&self) -> usize {
        let previous = self
            .inner
            .uses
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Current usage count.
    pub fn uses(&self) -> usize {
        self.inner.uses.load(Ordering::Acquire)
    }

    /// Snapshot of the load state.
    pub fn state(&self) -> TileLoadState {
        self.inner.state.borrow().clone()
    }

    /// Wait until the tile is loaded or failed.
    ///
    /// Never fails: a signal dropped while still pending settles as
    /// [`TileLoadState::Failed`].
    pub async fn settled(&self) -> TileLoadState {
        let mut rx = self.inner.state.clone();
        let result = rx
            .wait_for(TileLoadState::is_settled)
            .await
            .map(|state| TileLoadState::clone(&state));
        match result {
            Ok(state) => state,
            Err(_) => TileLoadState::Failed("tile load signal dropped".to_string()),
        }
    }
}

impl fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileHandle")
            .field("id", &self.inner.id)
            .field("tile", &self.inner.tile)
            .field("cache_key", &self.inner.cache_key)
            .field("uses", &self.uses())
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

// =============================================================================
// Load Signal
// =============================================================================

/// Sender side of a tile's load state, kept by the owning cache.
#[derive(Debug)]
pub struct TileLoadSignal {
    tx: watch::Sender<TileLoadState>,
}

impl TileLoadSignal {
    /// Mark the tile as loaded.
    pub fn load(&self) {
        self.tx.send_replace(TileLoadState::Loaded);
    }

    /// Mark the tile as failed.
    pub fn fail(&self, reason: impl Into<String>) {
        self.tx.send_replace(TileLoadState::Failed(reason.into()));
    }

    /// Current state as seen by the sender.
    pub fn state(&self) -> TileLoadState {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile() -> TileId {
        TileId::new("osm", 3, 1, 2)
    }

    #[test]
    fn test_new_handle_is_pending_with_zero_uses() {
        let (handle, _signal) = TileHandle::new(tile(), 256.0, None);
        assert_eq!(handle.state(), TileLoadState::Pending);
        assert_eq!(handle.uses(), 0);
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let (a, _sa) = TileHandle::new(tile(), 256.0, None);
        let (b, _sb) = TileHandle::new(tile(), 256.0, None);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_retain_and_release_count() {
        let (handle, _signal) = TileHandle::new(tile(), 256.0, None);
        assert_eq!(handle.retain(), 1);
        assert_eq!(handle.retain(), 2);
        assert_eq!(handle.release_use(), 1);
        assert_eq!(handle.release_use(), 0);
        // Saturates instead of wrapping.
        assert_eq!(handle.release_use(), 0);
        assert_eq!(handle.uses(), 0);
    }

    #[test]
    fn test_failed_handle_has_no_cache() {
        let handle = TileHandle::failed(tile(), 256.0, "no cache");
        assert!(handle.cache_key().is_none());
        assert_eq!(handle.state(), TileLoadState::Failed("no cache".into()));
    }

    #[tokio::test]
    async fn test_settled_waits_for_signal() {
        let (handle, signal) = TileHandle::new(tile(), 256.0, None);
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.settled().await })
        };
        tokio::task::yield_now().await;
        signal.load();
        assert_eq!(waiter.await.unwrap(), TileLoadState::Loaded);
    }

    #[tokio::test]
    async fn test_dropped_signal_settles_as_failed() {
        let (handle, signal) = TileHandle::new(tile(), 256.0, None);
        drop(signal);
        assert!(matches!(handle.settled().await, TileLoadState::Failed(_)));
    }

    #[tokio::test]
    async fn test_loaded_state_survives_signal_drop() {
        let (handle, signal) = TileHandle::new(tile(), 256.0, None);
        signal.load();
        drop(signal);
        assert_eq!(handle.settled().await, TileLoadState::Loaded);
    }
}
