//! Pending-render registry.
//!
//! Maps a canonical [`TileSetId`] to at most one in-flight render and
//! coalesces every request for the same tile set into it. Each render
//! carries a [`RenderId`] generation number; a tile set that is canceled and
//! immediately requested again gets a new id, so continuations belonging to
//! the old render can tell they are stale.
//!
//! # Lifecycle
//!
//! ```text
//! submit ──► (new) acquire tiles ──► pending ──► finish(Ok | Err) ──► removed
//!   │                                   ▲   │
//!   └──► (existing) retain tiles ───────┘   └──► release (last consumer)
//!                                                 └──► finish(FullyCanceled)
//! ```
//!
//! The registry is plain data with `&mut self` methods; the renderer owns it
//! behind a lock.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use super::completion::{Completion, RenderError, RenderResult};
use crate::paint::SharedDrawTarget;
use crate::request::{canonicalize, identity_key, DrawSpec, RequestError, TileSetId, TileSpecEntry};
use crate::style::LayerRole;
use crate::tile::{TileHandle, TileLifecycleAdapter};

/// Generation number of a pending render.
pub type RenderId = u64;

/// Identifies one consumer within the renderer.
pub type ConsumerId = u64;

/// One caller attached to a pending render.
pub struct Consumer {
    pub id: ConsumerId,
    pub target: SharedDrawTarget,
    /// Canonical draw spec.
    pub draw: DrawSpec,
    /// Canonical tile spec.
    pub tiles: Vec<TileSpecEntry>,
    completion: Completion,
}

impl Consumer {
    fn complete(self, result: RenderResult) {
        self.completion.complete(result);
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id)
            .field("draw", &self.draw)
            .field("tiles", &self.tiles.len())
            .finish_non_exhaustive()
    }
}

/// A tile handle paired with the entry it was acquired for.
#[derive(Debug, Clone)]
pub struct AcquiredTile {
    /// Index of the entry in the render's canonical tile list.
    pub entry_index: usize,
    pub entry: TileSpecEntry,
    pub role: LayerRole,
    pub handle: TileHandle,
}

/// An in-flight render shared by every consumer of one tile set.
#[derive(Debug)]
pub struct PendingRender {
    pub tile_set_id: TileSetId,
    pub render_id: RenderId,
    /// Canonical tile entries, as first requested.
    pub entries: Vec<TileSpecEntry>,
    pub tiles: Vec<AcquiredTile>,
    pub consumers: Vec<Consumer>,
}

impl PendingRender {
    /// Handles in acquisition order.
    pub fn handles(&self) -> Vec<TileHandle> {
        self.tiles.iter().map(|t| t.handle.clone()).collect()
    }
}

/// The caller's handle on its share of a render.
///
/// Must be passed to `release` exactly once, whatever the outcome.
#[must_use = "a render token must be released"]
#[derive(Debug)]
pub struct RenderToken {
    pub render_id: RenderId,
    pub consumer_id: ConsumerId,
    pub tiles: Vec<TileHandle>,
    pub tile_set_id: TileSetId,
}

/// Work the caller must schedule for a newly created render.
#[derive(Debug)]
pub struct NewRender {
    pub tile_set_id: TileSetId,
    pub render_id: RenderId,
    pub tiles: Vec<TileHandle>,
}

/// Result of [`PendingRenderStore::submit`].
#[derive(Debug)]
pub struct Submission {
    pub token: RenderToken,
    /// Present when the request started a new render.
    pub new_render: Option<NewRender>,
}

/// Registry of pending renders keyed by tile set.
pub struct PendingRenderStore {
    renders: HashMap<TileSetId, PendingRender>,
    next_render_id: RenderId,
    next_consumer_id: ConsumerId,
    tiles: TileLifecycleAdapter,
}

impl PendingRenderStore {
    /// Create an empty registry acquiring through `tiles`.
    pub fn new(tiles: TileLifecycleAdapter) -> Self {
        Self {
            renders: HashMap::new(),
            next_render_id: 0,
            next_consumer_id: 0,
            tiles,
        }
    }

    /// Attach a request to the render for its tile set, creating it if needed.
    ///
    /// `roles` are the distinct layer roles of the current style, in style
    /// order; a new render acquires one handle per `(entry, role)`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the request cannot be canonicalized;
    /// nothing is acquired or stored in that case.
    pub fn submit(
        &mut self,
        target: SharedDrawTarget,
        draw: &DrawSpec,
        tiles: &[TileSpecEntry],
        completion: Completion,
        roles: &[LayerRole],
    ) -> Result<Submission, RequestError> {
        let canonical = canonicalize(tiles, draw)?;
        let tile_set_id = identity_key(&canonical.tiles);

        self.next_consumer_id += 1;
        let consumer = Consumer {
            id: self.next_consumer_id,
            target,
            draw: canonical.draw,
            tiles: canonical.tiles,
            completion,
        };
        let consumer_id = consumer.id;

        if let Some(render) = self.renders.get_mut(&tile_set_id) {
            for tile in &render.tiles {
                tile.handle.retain();
            }
            render.consumers.push(consumer);
            debug!(
                tile_set = %tile_set_id,
                render_id = render.render_id,
                consumers = render.consumers.len(),
                "Coalesced render request"
            );
            return Ok(Submission {
                token: RenderToken {
                    render_id: render.render_id,
                    consumer_id,
                    tiles: render.handles(),
                    tile_set_id,
                },
                new_render: None,
            });
        }

        self.next_render_id += 1;
        let render_id = self.next_render_id;

        let mut acquired = Vec::with_capacity(consumer.tiles.len() * roles.len());
        for role in roles {
            for (entry_index, entry) in consumer.tiles.iter().enumerate() {
                acquired.push(AcquiredTile {
                    entry_index,
                    entry: entry.clone(),
                    role: *role,
                    handle: self.tiles.acquire(entry, *role),
                });
            }
        }

        let render = PendingRender {
            tile_set_id: tile_set_id.clone(),
            render_id,
            entries: consumer.tiles.clone(),
            tiles: acquired,
            consumers: vec![consumer],
        };
        let handles = render.handles();
        debug!(
            tile_set = %tile_set_id,
            render_id,
            tiles = handles.len(),
            "Created pending render"
        );
        self.renders.insert(tile_set_id.clone(), render);

        Ok(Submission {
            token: RenderToken {
                render_id,
                consumer_id,
                tiles: handles.clone(),
                tile_set_id: tile_set_id.clone(),
            },
            new_render: Some(NewRender {
                tile_set_id,
                render_id,
                tiles: handles,
            }),
        })
    }

    /// Terminal transition of a render.
    ///
    /// Completes every consumer in attachment order and removes the render.
    /// Returns `false` without doing anything when no render with this id
    /// and generation exists.
    pub fn finish(&mut self, tile_set_id: &TileSetId, render_id: RenderId, result: RenderResult) -> bool {
        if !self.is_current(tile_set_id, render_id) {
            return false;
        }
        let Some(render) = self.renders.remove(tile_set_id) else {
            return false;
        };
        debug!(
            tile_set = %tile_set_id,
            render_id,
            consumers = render.consumers.len(),
            outcome = ?result,
            "Finished render"
        );
        for consumer in render.consumers {
            consumer.complete(result.clone());
        }
        true
    }

    /// Release a token's share of its render.
    ///
    /// The token's tiles are always given back. If its render is still
    /// pending, the consumer is told it was canceled and detached; the render
    /// itself is finished once no consumer remains.
    pub fn release(&mut self, token: RenderToken) {
        for handle in &token.tiles {
            self.tiles.release(handle);
        }

        if !self.is_current(&token.tile_set_id, token.render_id) {
            return;
        }
        let Some(render) = self.renders.get_mut(&token.tile_set_id) else {
            return;
        };
        if let Some(index) = render.consumers.iter().position(|c| c.id == token.consumer_id) {
            let consumer = render.consumers.remove(index);
            consumer.complete(Err(RenderError::Canceled));
        }
        if render.consumers.is_empty() {
            self.finish(&token.tile_set_id, token.render_id, Err(RenderError::FullyCanceled));
        }
    }

    /// Cancel every pending render and invalidate loaded tiles.
    ///
    /// By the time this returns every consumer of every pending render has
    /// received [`RenderError::Canceled`]. Returns the number of renders
    /// canceled.
    pub fn cancel_all(&mut self) -> usize {
        let keys: Vec<(TileSetId, RenderId)> = self
            .renders
            .values()
            .map(|r| (r.tile_set_id.clone(), r.render_id))
            .collect();
        for (tile_set_id, render_id) in &keys {
            self.finish(tile_set_id, *render_id, Err(RenderError::Canceled));
        }
        self.renders.clear();
        self.tiles.invalidate_all();
        if !keys.is_empty() {
            info!(canceled = keys.len(), "Canceled all pending renders");
        }
        keys.len()
    }

    /// Whether `(tile_set_id, render_id)` names the live render.
    pub fn is_current(&self, tile_set_id: &TileSetId, render_id: RenderId) -> bool {
        self.renders
            .get(tile_set_id)
            .is_some_and(|r| r.render_id == render_id)
    }

    /// The pending render for a tile set.
    pub fn get(&self, tile_set_id: &TileSetId) -> Option<&PendingRender> {
        self.renders.get(tile_set_id)
    }

    /// The tile adapter used for acquisition and release.
    pub fn tiles(&self) -> &TileLifecycleAdapter {
        &self.tiles
    }

    /// Number of pending renders.
    pub fn len(&self) -> usize {
        self.renders.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.renders.is_empty()
    }
}

impl fmt::Debug for PendingRenderStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRenderStore")
            .field("pending", &self.renders.len())
            .field("next_render_id", &self.next_render_id)
            .finish()
    }
}
