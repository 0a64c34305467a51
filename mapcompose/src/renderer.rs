//! The renderer facade.
//!
//! Owns one style, one painter with its offscreen surface, and the source
//! caches, and turns many concurrent render requests into as few paint
//! passes as possible.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use mapcompose::config::RendererConfig;
//! use mapcompose::paint::PixmapTarget;
//! use mapcompose::renderer::{Renderer, RendererParts};
//! use mapcompose::request::{DrawSpec, TileSpecEntry};
//! use mapcompose::standalone::{FillPainter, MemorySourceCache, StaticStyle};
//! use mapcompose::style::{LayerRole, StyleLayer};
//! use mapcompose::tile::SourceCacheSet;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let style = StaticStyle::ready(vec![StyleLayer::new("water", LayerRole::Other, Some("osm"))]);
//! let cache = Arc::new(MemorySourceCache::with_auto_load(LayerRole::Other, "osm"));
//! let parts = RendererParts {
//!     style: Arc::new(style),
//!     painter: Box::new(FillPainter::new()),
//!     caches: SourceCacheSet::new().with_cache(LayerRole::Other, "osm", cache),
//! };
//! let renderer = Renderer::new(RendererConfig::default(), parts).unwrap();
//!
//! let target = PixmapTarget::new(256, 256).unwrap().shared();
//! let tiles = vec![TileSpecEntry::new("osm", 1, 0, 0, 0.0, 0.0, 256.0)];
//! let draw = DrawSpec::new(0.0, 0.0, 256.0, 256.0, 0.0, 0.0);
//!
//! let (token, completion) = renderer.submit_render(target.clone(), &draw, &tiles).unwrap();
//! assert_eq!(completion.await, Ok(()));
//! renderer.release_render(token);
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RendererConfig;
use crate::paint::{Painter, SharedDrawTarget};
use crate::render::{
    Completion, Compositor, Frame, NewRender, PendingRenderStore, RenderCompletion, RenderError,
    RenderId, RenderToken,
};
use crate::request::{DrawSpec, TileSetId, TileSpecEntry};
use crate::sequencer::{ConfigChangeSequencer, ConfigMutation, SequenceId};
use crate::style::{roles_in_order, BoxFuture, LayerRole, Style};
use crate::tile::{SourceCacheSet, TileHandle, TileLifecycleAdapter, TileLoadState};

// =============================================================================
// Errors and Events
// =============================================================================

/// Errors constructing a renderer.
#[derive(Debug, Error)]
pub enum RendererError {
    /// Constructed outside a tokio runtime.
    #[error("renderer must be created inside a tokio runtime")]
    NoRuntime,

    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(String),
}

/// Notifications published by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// A config change was applied to the style.
    ConfigChanged { sequence_id: SequenceId },
}

/// The collaborators a renderer drives.
pub struct RendererParts {
    pub style: Arc<dyn Style>,
    pub painter: Box<dyn Painter>,
    pub caches: SourceCacheSet,
}

// =============================================================================
// Shared Core
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct ViewState {
    zoom: f64,
    filter_zoom: f64,
}

/// State shared between the facade and its spawned tasks.
///
/// Locks are taken in the order apply, store, compositor, draw target. The
/// view lock is only ever held briefly on its own or inside the store lock.
struct RendererCore {
    config: RendererConfig,
    style: Arc<dyn Style>,
    caches: Arc<SourceCacheSet>,
    store: Mutex<PendingRenderStore>,
    compositor: Mutex<Compositor>,
    sequencer: ConfigChangeSequencer,
    /// Held from drain to event so applied batches never interleave.
    apply: Mutex<()>,
    view: Mutex<ViewState>,
    events: broadcast::Sender<RendererEvent>,
    shutdown: CancellationToken,
}

impl RendererCore {
    /// Wait for a new render's tiles, then composite it if still current.
    async fn settle(self: Arc<Self>, render: NewRender) {
        let NewRender {
            tile_set_id,
            render_id,
            tiles,
        } = render;

        let outcomes = tokio::select! {
            _ = self.shutdown.cancelled() => {
                debug!(tile_set = %tile_set_id, render_id, "Renderer shut down while settling");
                return;
            }
            outcomes = join_all(tiles.iter().map(|handle| handle.settled())) => outcomes,
        };
        let settled: HashMap<u64, TileLoadState> =
            tiles.iter().map(TileHandle::id).zip(outcomes).collect();

        self.composite(&tile_set_id, render_id, &settled);
    }

    fn composite(&self, tile_set_id: &TileSetId, render_id: RenderId, settled: &HashMap<u64, TileLoadState>) {
        let mut store = self.store.lock();
        let Some(render) = store.get(tile_set_id).filter(|r| r.render_id == render_id) else {
            debug!(tile_set = %tile_set_id, render_id, "Render canceled or superseded before compositing");
            return;
        };
        let view = *self.view.lock();
        let result = {
            let mut compositor = self.compositor.lock();
            let frame = Frame {
                style: self.style.as_ref(),
                tiles: store.tiles(),
                zoom: view.zoom,
                filter_zoom: view.filter_zoom,
            };
            compositor.composite(render, settled, &frame)
        };
        store.finish(tile_set_id, render_id, result);
        store.tiles().clear_currently_rendering();
    }

    /// Apply the queued config changes if `captured` is still the latest.
    async fn apply_config(self: Arc<Self>, captured: SequenceId) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return false,
            _ = self.style.wait_until_ready() => {}
        }
        let _apply = self.apply.lock();
        let Some(mutations) = self.sequencer.try_drain(captured) else {
            debug!(sequence_id = captured, "Config change superseded");
            return false;
        };

        let canceled = self.store.lock().cancel_all();
        let applied = mutations.len();
        for mutation in mutations {
            mutation(self.style.as_ref());
        }
        let zoom = self.view.lock().zoom;
        self.style.update(zoom);
        info!(sequence_id = captured, applied, canceled, "Applied config change");

        // No subscribers is fine.
        let _ = self.events.send(RendererEvent::ConfigChanged {
            sequence_id: captured,
        });
        true
    }
}

// =============================================================================
// Config Change Futures
// =============================================================================

/// Resolves once a config change has been applied or superseded.
///
/// Nothing runs until the future is first polled: it then waits for the
/// style to be ready and applies the queue only if no later change has been
/// issued in the meantime. Changes requested back to back therefore always
/// collapse into one apply, performed by whichever is still the latest.
///
/// `true` means this change was the most recent and applied the queue;
/// `false` means a later change owns the queue, or the renderer shut down.
#[must_use = "a config change is applied when awaited"]
pub struct ConfigChange {
    sequence_id: SequenceId,
    apply: BoxFuture<'static, bool>,
}

impl ConfigChange {
    fn new(core: Arc<RendererCore>, sequence_id: SequenceId) -> Self {
        Self {
            sequence_id,
            apply: Box::pin(core.apply_config(sequence_id)),
        }
    }

    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }
}

impl Future for ConfigChange {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        self.apply.as_mut().poll(cx)
    }
}

impl fmt::Debug for ConfigChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigChange")
            .field("sequence_id", &self.sequence_id)
            .finish_non_exhaustive()
    }
}

/// A mutation that has been queued but not yet triggered.
///
/// Until [`commit`](Self::commit) is called the mutation only rides along
/// with whichever change is triggered next. Dropping it leaves the mutation
/// queued.
#[must_use = "a staged config change does nothing until committed"]
pub struct StagedConfigChange {
    core: Arc<RendererCore>,
}

impl StagedConfigChange {
    /// Trigger the change.
    pub fn commit(self) -> ConfigChange {
        let sequence_id = self.core.sequencer.bump();
        ConfigChange::new(self.core, sequence_id)
    }
}

impl fmt::Debug for StagedConfigChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedConfigChange").finish_non_exhaustive()
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Coordinates render requests against one style and painter.
///
/// Must be created inside a tokio runtime; settle tasks are spawned onto
/// it. Dropping the renderer shuts it down.
pub struct Renderer {
    core: Arc<RendererCore>,
    runtime: Handle,
}

impl Renderer {
    /// Create a renderer and schedule the initial style update.
    pub fn new(config: RendererConfig, parts: RendererParts) -> Result<Self, RendererError> {
        let runtime = Handle::try_current().map_err(|_| RendererError::NoRuntime)?;
        config
            .validate()
            .map_err(|e| RendererError::InvalidConfig(e.to_string()))?;

        let RendererParts {
            style,
            painter,
            caches,
        } = parts;
        let caches = Arc::new(caches);
        let compositor = Compositor::new(config.surface_size, painter)?;
        let (events, _) = broadcast::channel(config.event_capacity);

        let core = Arc::new(RendererCore {
            store: Mutex::new(PendingRenderStore::new(TileLifecycleAdapter::new(Arc::clone(
                &caches,
            )))),
            compositor: Mutex::new(compositor),
            sequencer: ConfigChangeSequencer::new(),
            apply: Mutex::new(()),
            view: Mutex::new(ViewState {
                zoom: config.zoom,
                filter_zoom: config.filter_zoom,
            }),
            events,
            shutdown: CancellationToken::new(),
            style,
            caches,
            config,
        });

        let ready_core = Arc::clone(&core);
        runtime.spawn(async move {
            tokio::select! {
                _ = ready_core.shutdown.cancelled() => {}
                _ = ready_core.style.wait_until_ready() => {
                    let zoom = ready_core.view.lock().zoom;
                    ready_core.style.update(zoom);
                    debug!(zoom, "Style ready");
                }
            }
        });

        info!(
            surface_size = core.config.surface_size,
            caches = core.caches.len(),
            "Renderer created"
        );
        Ok(Self { core, runtime })
    }

    // ==================== Renders ====================

    /// Request a render of `tiles` into `target`.
    ///
    /// Returns the token to release once the caller is done with the result,
    /// and a future resolving to the outcome. Requests whose tile sets are
    /// equal up to translation share one render.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidRequest`] when the request is malformed.
    pub fn submit_render(
        &self,
        target: SharedDrawTarget,
        draw: &DrawSpec,
        tiles: &[TileSpecEntry],
    ) -> Result<(RenderToken, RenderCompletion), RenderError> {
        let roles = roles_in_order(&self.core.style.layers());
        let (completion, receiver) = Completion::channel();
        let submission = self
            .core
            .store
            .lock()
            .submit(target, draw, tiles, completion, &roles)?;

        if let Some(new_render) = submission.new_render {
            let core = Arc::clone(&self.core);
            self.runtime.spawn(core.settle(new_render));
        }
        Ok((submission.token, receiver))
    }

    /// Release a token obtained from [`submit_render`](Self::submit_render).
    ///
    /// Always gives the token's tiles back. If the render is still pending,
    /// this consumer is completed with [`RenderError::Canceled`]; the render
    /// is dropped once its last consumer is released.
    pub fn release_render(&self, token: RenderToken) {
        self.core.store.lock().release(token);
    }

    /// Number of renders waiting for tiles.
    pub fn pending_render_count(&self) -> usize {
        self.core.store.lock().len()
    }

    // ==================== Config Changes ====================

    /// Queue a style mutation and trigger it.
    ///
    /// The mutation is queued immediately; the returned future performs the
    /// apply.
    pub fn request_config_change<F>(&self, mutation: F) -> ConfigChange
    where
        F: FnOnce(&dyn Style) + Send + 'static,
    {
        self.request_boxed(Box::new(mutation))
    }

    /// Queue a style mutation without triggering it.
    pub fn stage_config_change<F>(&self, mutation: F) -> StagedConfigChange
    where
        F: FnOnce(&dyn Style) + Send + 'static,
    {
        self.stage_boxed(Box::new(mutation))
    }

    pub fn set_paint_property(&self, layer: &str, property: &str, value: Value) -> ConfigChange {
        self.request_boxed(paint_mutation(layer, property, value))
    }

    pub fn stage_paint_property(&self, layer: &str, property: &str, value: Value) -> StagedConfigChange {
        self.stage_boxed(paint_mutation(layer, property, value))
    }

    pub fn set_layout_property(&self, layer: &str, property: &str, value: Value) -> ConfigChange {
        self.request_boxed(layout_mutation(layer, property, value))
    }

    pub fn stage_layout_property(&self, layer: &str, property: &str, value: Value) -> StagedConfigChange {
        self.stage_boxed(layout_mutation(layer, property, value))
    }

    /// Replace a layer's filter expression.
    pub fn set_filter(&self, layer: &str, filter: Value) -> ConfigChange {
        self.request_boxed(filter_mutation(layer, filter))
    }

    pub fn stage_filter(&self, layer: &str, filter: Value) -> StagedConfigChange {
        self.stage_boxed(filter_mutation(layer, filter))
    }

    /// Show exactly the named layers and hide every other one.
    pub fn set_visible_layers(&self, names: &[&str]) -> ConfigChange {
        self.request_boxed(visibility_mutation(names))
    }

    pub fn stage_visible_layers(&self, names: &[&str]) -> StagedConfigChange {
        self.stage_boxed(visibility_mutation(names))
    }

    fn request_boxed(&self, mutation: ConfigMutation) -> ConfigChange {
        let sequence_id = self.core.sequencer.enqueue(mutation);
        ConfigChange::new(Arc::clone(&self.core), sequence_id)
    }

    fn stage_boxed(&self, mutation: ConfigMutation) -> StagedConfigChange {
        self.core.sequencer.stage(mutation);
        StagedConfigChange {
            core: Arc::clone(&self.core),
        }
    }

    // ==================== Zoom and Layers ====================

    /// Evaluate the style at `zoom` and filter layers by it.
    ///
    /// The zoom is clamped to the configured range. Changing it cancels
    /// every pending render.
    pub fn filter_for_zoom(&self, zoom: f64) {
        let zoom = zoom.clamp(self.core.config.min_zoom, self.core.config.max_zoom);
        {
            let mut view = self.core.view.lock();
            if view.filter_zoom == zoom {
                return;
            }
            view.filter_zoom = zoom;
            view.zoom = zoom;
        }
        self.core.style.update(zoom);
        let canceled = self.core.store.lock().cancel_all();
        info!(zoom, canceled, "Filter zoom changed");
    }

    pub fn zoom(&self) -> f64 {
        self.core.view.lock().zoom
    }

    pub fn filter_zoom(&self) -> f64 {
        self.core.view.lock().filter_zoom
    }

    /// Ids of visible layers in style order.
    ///
    /// With `zoom`, only layers whose zoom range contains it (both ends
    /// inclusive); with `sources`, only layers reading from one of them.
    pub fn visible_layers(&self, zoom: Option<f64>, sources: Option<&[&str]>) -> Vec<String> {
        self.core
            .style
            .layers()
            .into_iter()
            .filter(|layer| layer.visible)
            .filter(|layer| zoom.map_or(true, |z| layer.within_zoom_range(z)))
            .filter(|layer| {
                sources.map_or(true, |sources| {
                    layer
                        .source
                        .as_deref()
                        .is_some_and(|s| sources.contains(&s))
                })
            })
            .map(|layer| layer.id)
            .collect()
    }

    /// Sources with at least one visible layer at the filter zoom.
    ///
    /// Callers can use this to leave tiles of invisible sources out of their
    /// requests.
    pub fn visible_sources(&self) -> Vec<String> {
        let filter_zoom = self.filter_zoom();
        self.core
            .caches
            .sources(LayerRole::Other)
            .into_iter()
            .filter(|source| {
                !self
                    .visible_layers(Some(filter_zoom), Some(&[source.as_str()]))
                    .is_empty()
            })
            .collect()
    }

    /// The layer's `paint` object from the style document as loaded.
    ///
    /// Together with the `layout` and `filter` variants this lets callers
    /// restore a layer after [`set_paint_property`](Self::set_paint_property)
    /// and friends.
    pub fn layer_original_paint(&self, layer: &str) -> Option<Value> {
        self.core.style.original_paint(layer)
    }

    pub fn layer_original_layout(&self, layer: &str) -> Option<Value> {
        self.core.style.original_layout(layer)
    }

    pub fn layer_original_filter(&self, layer: &str) -> Option<Value> {
        self.core.style.original_filter(layer)
    }

    // ==================== Lifecycle ====================

    /// Receive [`RendererEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<RendererEvent> {
        self.core.events.subscribe()
    }

    /// Stop all background work.
    ///
    /// Renders still waiting for tiles stay pending; their completions
    /// resolve to [`RenderError::Abandoned`] once the renderer is dropped.
    pub fn shutdown(&self) {
        if !self.core.shutdown.is_cancelled() {
            info!("Renderer shutting down");
            self.core.shutdown.cancel();
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.core.shutdown.cancel();
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.core.config)
            .field("caches", &self.core.caches)
            .field("pending", &self.pending_render_count())
            .finish()
    }
}

fn paint_mutation(layer: &str, property: &str, value: Value) -> ConfigMutation {
    let (layer, property) = (layer.to_string(), property.to_string());
    Box::new(move |style| style.set_paint_property(&layer, &property, value))
}

fn layout_mutation(layer: &str, property: &str, value: Value) -> ConfigMutation {
    let (layer, property) = (layer.to_string(), property.to_string());
    Box::new(move |style| style.set_layout_property(&layer, &property, value))
}

fn filter_mutation(layer: &str, filter: Value) -> ConfigMutation {
    let layer = layer.to_string();
    Box::new(move |style| style.set_filter(&layer, filter))
}

fn visibility_mutation(names: &[&str]) -> ConfigMutation {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    Box::new(move |style| {
        for layer in style.layers() {
            let visibility = if names.contains(&layer.id) { "visible" } else { "none" };
            style.set_layout_property(&layer.id, "visibility", Value::from(visibility));
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::paint::PixmapTarget;
    use crate::render::RenderResult;
    use crate::request::TileId;
    use crate::standalone::{FillPainter, MemorySourceCache, StaticStyle};
    use crate::style::StyleLayer;
    use crate::tile::{RenderingTile, SourceCache};

    fn layers() -> Vec<StyleLayer> {
        vec![
            StyleLayer::new("water", LayerRole::Other, Some("osm")),
            StyleLayer::new("roads", LayerRole::Other, Some("osm")).with_zoom_range(Some(10.0), Some(14.0)),
            StyleLayer::new("hills", LayerRole::Other, Some("dem")),
            StyleLayer::new("labels", LayerRole::Symbol, Some("osm")),
        ]
    }

    fn renderer_with(style: Arc<StaticStyle>) -> (Renderer, Arc<MemorySourceCache>) {
        let cache = Arc::new(MemorySourceCache::new(LayerRole::Other, "osm"));
        let caches = SourceCacheSet::new()
            .with_cache(LayerRole::Other, "osm", cache.clone())
            .with_cache(LayerRole::Other, "dem", Arc::new(MemorySourceCache::new(LayerRole::Other, "dem")))
            .with_cache(LayerRole::Symbol, "osm", Arc::new(MemorySourceCache::new(LayerRole::Symbol, "osm")));
        let parts = RendererParts {
            style,
            painter: Box::new(FillPainter::new()),
            caches,
        };
        (Renderer::new(RendererConfig::default(), parts).unwrap(), cache)
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let parts = RendererParts {
            style: Arc::new(StaticStyle::ready(Vec::new())),
            painter: Box::new(FillPainter::new()),
            caches: SourceCacheSet::new(),
        };
        assert!(matches!(
            Renderer::new(RendererConfig::default(), parts),
            Err(RendererError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let parts = RendererParts {
            style: Arc::new(StaticStyle::ready(Vec::new())),
            painter: Box::new(FillPainter::new()),
            caches: SourceCacheSet::new(),
        };
        let config = RendererConfig::default().with_zoom_range(5.0, 1.0);
        assert!(matches!(
            Renderer::new(config, parts),
            Err(RendererError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_style_updated_once_ready() {
        let style = Arc::new(StaticStyle::new(layers()));
        let (_renderer, _) = renderer_with(style.clone());
        tokio::task::yield_now().await;
        assert_eq!(style.update_count(), 0);

        style.mark_ready();
        tokio::time::timeout(Duration::from_secs(1), async {
            while style.update_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(style.last_update_zoom(), Some(0.0));
    }

    #[tokio::test]
    async fn test_visible_layers_filters_by_zoom_and_source() {
        let style = Arc::new(StaticStyle::ready(layers()));
        let (renderer, _) = renderer_with(style);

        assert_eq!(
            renderer.visible_layers(None, None),
            vec!["water", "roads", "hills", "labels"]
        );
        assert_eq!(
            renderer.visible_layers(Some(14.0), Some(&["osm"])),
            vec!["water", "roads", "labels"]
        );
        assert_eq!(renderer.visible_layers(Some(15.0), Some(&["dem"])), vec!["hills"]);
    }

    #[tokio::test]
    async fn test_visible_sources_follow_visibility() {
        let style = Arc::new(StaticStyle::ready(layers()));
        let (renderer, _) = renderer_with(style.clone());
        assert_eq!(renderer.visible_sources(), vec!["dem", "osm"]);

        assert!(renderer.set_visible_layers(&["water"]).await);
        assert_eq!(renderer.visible_sources(), vec!["osm"]);
        assert_eq!(
            style.layout_property("hills", "visibility"),
            Some(json!("none"))
        );
    }

    #[tokio::test]
    async fn test_filter_for_zoom_clamps_and_cancels() {
        let style = Arc::new(StaticStyle::ready(layers()));
        let (renderer, _) = renderer_with(style.clone());
        let target = PixmapTarget::new(64, 64).unwrap().shared();
        let tiles = vec![TileSpecEntry::new("osm", 1, 0, 0, 0.0, 0.0, 64.0)];
        let draw = DrawSpec::new(0.0, 0.0, 64.0, 64.0, 0.0, 0.0);
        let (token, completion) = renderer.submit_render(target, &draw, &tiles).unwrap();
        assert_eq!(renderer.pending_render_count(), 1);

        renderer.filter_for_zoom(99.0);

        assert_eq!(renderer.filter_zoom(), 20.0);
        assert_eq!(renderer.zoom(), 20.0);
        assert_eq!(renderer.pending_render_count(), 0);
        assert_eq!(style.last_update_zoom(), Some(20.0));

        // Same zoom again is a no-op.
        let updates = style.update_count();
        renderer.filter_for_zoom(20.0);
        assert_eq!(style.update_count(), updates);

        assert_eq!(completion.await, Err(RenderError::Canceled));
        renderer.release_render(token);
    }

    #[tokio::test]
    async fn test_wrappers_apply_to_style() {
        let style = Arc::new(StaticStyle::ready(layers()));
        let (renderer, _) = renderer_with(style.clone());
        let mut events = renderer.subscribe();

        let paint = renderer.set_paint_property("water", "fill-color", json!("#00f"));
        let filter = renderer.set_filter("roads", json!(["==", "class", "motorway"]));
        assert!(!paint.await);
        assert!(filter.await);

        assert_eq!(style.paint_property("water", "fill-color"), Some(json!("#00f")));
        assert!(style.filter("roads").is_some());
        assert!(matches!(
            events.recv().await.unwrap(),
            RendererEvent::ConfigChanged { .. }
        ));
    }

    #[tokio::test]
    async fn test_original_properties_restore_a_layer() {
        let style = Arc::new(
            StaticStyle::from_json(
                r#"{"layers": [{"id": "water", "type": "fill", "source": "osm",
                    "paint": {"fill-color": "blue"},
                    "filter": ["==", "class", "ocean"]}]}"#,
            )
            .unwrap(),
        );
        let (renderer, _) = renderer_with(style.clone());

        assert!(renderer.set_paint_property("water", "fill-color", json!("red")).await);
        assert_eq!(style.paint_property("water", "fill-color"), Some(json!("red")));

        let original = renderer.layer_original_paint("water").unwrap();
        assert!(
            renderer
                .set_paint_property("water", "fill-color", original["fill-color"].clone())
                .await
        );
        assert_eq!(style.paint_property("water", "fill-color"), Some(json!("blue")));
        assert_eq!(
            renderer.layer_original_filter("water"),
            Some(json!(["==", "class", "ocean"]))
        );
        assert_eq!(renderer.layer_original_layout("water"), None);
        assert_eq!(renderer.layer_original_paint("roads"), None);
    }

    #[tokio::test]
    async fn test_staged_change_applies_on_commit() {
        let style = Arc::new(StaticStyle::ready(layers()));
        let (renderer, _) = renderer_with(style.clone());

        let staged = renderer.stage_layout_property("labels", "visibility", json!("none"));
        tokio::task::yield_now().await;
        assert_eq!(style.mutation_count(), 0);

        assert!(staged.commit().await);
        assert_eq!(style.mutation_count(), 1);
        assert!(!renderer.visible_layers(None, None).contains(&"labels".to_string()));
    }

    /// Cache that checks, when its rendering list is cleared, whether the
    /// watched consumer has already been completed.
    struct ClearWatcher {
        inner: MemorySourceCache,
        completion: parking_lot::Mutex<Option<RenderCompletion>>,
        seen_at_clear: parking_lot::Mutex<Vec<Option<RenderResult>>>,
    }

    impl SourceCache for ClearWatcher {
        fn acquire_tile(&self, tile: &TileId, size: f64) -> TileHandle {
            self.inner.acquire_tile(tile, size)
        }

        fn release_tile(&self, handle: &TileHandle) {
            self.inner.release_tile(handle)
        }

        fn invalidate_all_loaded_tiles(&self) {
            self.inner.invalidate_all_loaded_tiles()
        }

        fn set_currently_rendering(&self, tiles: Vec<RenderingTile>) {
            if tiles.is_empty() {
                if let Some(completion) = self.completion.lock().as_mut() {
                    self.seen_at_clear.lock().push(completion.try_result());
                }
            }
            self.inner.set_currently_rendering(tiles)
        }
    }

    #[tokio::test]
    async fn test_rendering_list_cleared_after_consumers_complete() {
        let watcher = Arc::new(ClearWatcher {
            inner: MemorySourceCache::new(LayerRole::Other, "osm"),
            completion: parking_lot::Mutex::new(None),
            seen_at_clear: parking_lot::Mutex::new(Vec::new()),
        });
        let parts = RendererParts {
            style: Arc::new(StaticStyle::ready(vec![StyleLayer::new("water", LayerRole::Other, Some("osm"))])),
            painter: Box::new(FillPainter::new()),
            caches: SourceCacheSet::new().with_cache(LayerRole::Other, "osm", watcher.clone()),
        };
        let renderer = Renderer::new(RendererConfig::default(), parts).unwrap();

        let tile = TileId::new("osm", 1, 0, 0);
        let (token, completion) = renderer
            .submit_render(
                PixmapTarget::new(64, 64).unwrap().shared(),
                &DrawSpec::new(0.0, 0.0, 64.0, 64.0, 0.0, 0.0),
                &[TileSpecEntry::new("osm", 1, 0, 0, 0.0, 0.0, 64.0)],
            )
            .unwrap();
        *watcher.completion.lock() = Some(completion);
        watcher.inner.load_tile(&tile);

        tokio::time::timeout(Duration::from_secs(1), async {
            while renderer.pending_render_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*watcher.seen_at_clear.lock(), vec![Some(Ok(()))]);
        assert!(watcher.inner.currently_rendering().is_empty());
        renderer.release_render(token);
    }

    #[tokio::test]
    async fn test_shutdown_resolves_pending_config_change_false() {
        let style = Arc::new(StaticStyle::new(layers()));
        let (renderer, _) = renderer_with(style.clone());
        let change = renderer.set_paint_property("water", "fill-opacity", json!(0.5));
        renderer.shutdown();
        assert!(!change.await);
        assert_eq!(style.mutation_count(), 0);
    }
}
