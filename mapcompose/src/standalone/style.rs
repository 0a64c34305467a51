//! A style held entirely in memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::style::{BoxFuture, LayerRole, Style, StyleLayer};

#[derive(Default)]
struct StyleState {
    layers: Vec<StyleLayer>,
    paint: HashMap<(String, String), Value>,
    layout: HashMap<(String, String), Value>,
    filters: HashMap<String, Value>,
    originals: HashMap<String, LayerOriginals>,
    last_update_zoom: Option<f64>,
}

/// Layer JSON kept from the style document.
#[derive(Default)]
struct LayerOriginals {
    paint: Option<Value>,
    layout: Option<Value>,
    filter: Option<Value>,
}

/// Style whose layers and properties live in memory.
///
/// Property values are stored but not evaluated, except layout
/// `visibility`, which toggles the layer's `visible` flag.
pub struct StaticStyle {
    state: RwLock<StyleState>,
    ready: watch::Sender<bool>,
    updates: AtomicUsize,
    placements: AtomicUsize,
    mutations: AtomicUsize,
}

impl StaticStyle {
    /// A style that is not ready until [`mark_ready`](Self::mark_ready).
    pub fn new(layers: Vec<StyleLayer>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            state: RwLock::new(StyleState {
                layers,
                ..StyleState::default()
            }),
            ready,
            updates: AtomicUsize::new(0),
            placements: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
        }
    }

    /// A style that is ready immediately.
    pub fn ready(layers: Vec<StyleLayer>) -> Self {
        let style = Self::new(layers);
        style.mark_ready();
        style
    }

    /// Build a ready style from a style document's `layers` array.
    ///
    /// Reads `id`, `type`, `source`, `minzoom`, `maxzoom`, `paint`, `layout`
    /// and `filter` of each layer; everything else is ignored. The `paint`,
    /// `layout` and `filter` values seed the current properties and are also
    /// kept untouched as the layer's originals.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let document: StyleDocument = serde_json::from_str(text)?;
        let mut state = StyleState::default();

        for doc in document.layers {
            let mut layer = StyleLayer::new(
                doc.id.clone(),
                LayerRole::for_layer_type(&doc.layer_type),
                doc.source.as_deref(),
            )
            .with_zoom_range(doc.minzoom, doc.maxzoom);

            if let Some(Value::Object(paint)) = &doc.paint {
                for (property, value) in paint {
                    state.paint.insert((doc.id.clone(), property.clone()), value.clone());
                }
            }
            if let Some(Value::Object(layout)) = &doc.layout {
                for (property, value) in layout {
                    state.layout.insert((doc.id.clone(), property.clone()), value.clone());
                }
                layer.visible = layout.get("visibility").and_then(Value::as_str) != Some("none");
            }
            if let Some(filter) = &doc.filter {
                state.filters.insert(doc.id.clone(), filter.clone());
            }

            state.layers.push(layer);
            state.originals.insert(
                doc.id,
                LayerOriginals {
                    paint: doc.paint,
                    layout: doc.layout,
                    filter: doc.filter,
                },
            );
        }

        let style = Self::new(Vec::new());
        *style.state.write() = state;
        style.mark_ready();
        Ok(style)
    }

    /// Resolve every pending and future `wait_until_ready`.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn paint_property(&self, layer: &str, property: &str) -> Option<Value> {
        let key = (layer.to_string(), property.to_string());
        self.state.read().paint.get(&key).cloned()
    }

    pub fn layout_property(&self, layer: &str, property: &str) -> Option<Value> {
        let key = (layer.to_string(), property.to_string());
        self.state.read().layout.get(&key).cloned()
    }

    pub fn filter(&self, layer: &str) -> Option<Value> {
        self.state.read().filters.get(layer).cloned()
    }

    /// Number of `update` calls.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::Acquire)
    }

    /// Number of `update_placement` calls.
    pub fn placement_count(&self) -> usize {
        self.placements.load(Ordering::Acquire)
    }

    /// Number of property and filter mutations applied.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::Acquire)
    }

    /// Zoom passed to the most recent `update`.
    pub fn last_update_zoom(&self) -> Option<f64> {
        self.state.read().last_update_zoom
    }
}

impl Style for StaticStyle {
    fn layers(&self) -> Vec<StyleLayer> {
        self.state.read().layers.clone()
    }

    fn wait_until_ready(&self) -> BoxFuture<'_, ()> {
        let mut ready = self.ready.subscribe();
        Box::pin(async move {
            // The sender lives as long as `self`, so this cannot close early.
            let _ = ready.wait_for(|ready| *ready).await;
        })
    }

    fn set_paint_property(&self, layer: &str, property: &str, value: Value) {
        self.mutations.fetch_add(1, Ordering::AcqRel);
        self.state
            .write()
            .paint
            .insert((layer.to_string(), property.to_string()), value);
    }

    fn set_layout_property(&self, layer: &str, property: &str, value: Value) {
        self.mutations.fetch_add(1, Ordering::AcqRel);
        let mut state = self.state.write();
        if property == "visibility" {
            let visible = value.as_str() != Some("none");
            if let Some(target) = state.layers.iter_mut().find(|l| l.id == layer) {
                target.visible = visible;
            }
        }
        state
            .layout
            .insert((layer.to_string(), property.to_string()), value);
    }

    fn set_filter(&self, layer: &str, filter: Value) {
        self.mutations.fetch_add(1, Ordering::AcqRel);
        self.state.write().filters.insert(layer.to_string(), filter);
    }

    fn update(&self, zoom: f64) {
        self.updates.fetch_add(1, Ordering::AcqRel);
        self.state.write().last_update_zoom = Some(zoom);
    }

    fn update_placement(&self) {
        self.placements.fetch_add(1, Ordering::AcqRel);
    }

    fn original_paint(&self, layer: &str) -> Option<Value> {
        self.state.read().originals.get(layer)?.paint.clone()
    }

    fn original_layout(&self, layer: &str) -> Option<Value> {
        self.state.read().originals.get(layer)?.layout.clone()
    }

    fn original_filter(&self, layer: &str) -> Option<Value> {
        self.state.read().originals.get(layer)?.filter.clone()
    }
}

impl fmt::Debug for StaticStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticStyle")
            .field("layers", &self.state.read().layers.len())
            .field("ready", &self.is_ready())
            .field("updates", &self.update_count())
            .finish()
    }
}

#[derive(Deserialize)]
struct StyleDocument {
    layers: Vec<LayerDocument>,
}

#[derive(Deserialize)]
struct LayerDocument {
    id: String,
    #[serde(rename = "type")]
    layer_type: String,
    source: Option<String>,
    minzoom: Option<f64>,
    maxzoom: Option<f64>,
    paint: Option<Value>,
    layout: Option<Value>,
    filter: Option<Value>,
}
