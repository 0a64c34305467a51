//! Style contract.
//!
//! The coordinator does not parse or evaluate styles. It needs four things
//! from one: the ordered list of layers with their rendering role, a
//! readiness signal, entry points for property mutations, and a way to
//! recompute derived state after those mutations.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which kind of layer will consume a tile.
///
/// Symbol (label) layers and all other layers are served by separate source
/// caches, so a tile set is acquired once per role present in the style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerRole {
    /// Text and icon placement layers.
    Symbol,
    /// Fill, line, raster and every other geometry layer.
    Other,
}

impl LayerRole {
    /// Role for a style layer type string (`"symbol"`, `"fill"`, ...).
    pub fn for_layer_type(layer_type: &str) -> Self {
        if layer_type == "symbol" {
            LayerRole::Symbol
        } else {
            LayerRole::Other
        }
    }

    /// Prefix used in source cache names.
    pub fn prefix(&self) -> &'static str {
        match self {
            LayerRole::Symbol => "symbol",
            LayerRole::Other => "other",
        }
    }
}

/// Summary of one style layer as the coordinator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleLayer {
    pub id: String,
    pub role: LayerRole,
    /// Source the layer draws from; `None` for background-like layers.
    pub source: Option<String>,
    /// Layout `visibility` is `visible`.
    pub visible: bool,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
}

impl StyleLayer {
    /// A visible layer with no zoom limits.
    pub fn new(id: impl Into<String>, role: LayerRole, source: Option<&str>) -> Self {
        Self {
            id: id.into(),
            role,
            source: source.map(str::to_string),
            visible: true,
            min_zoom: None,
            max_zoom: None,
        }
    }

    /// Set the zoom range.
    pub fn with_zoom_range(mut self, min_zoom: Option<f64>, max_zoom: Option<f64>) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Whether the layer draws nothing at `zoom`.
    ///
    /// The maximum zoom is exclusive.
    pub fn is_hidden(&self, zoom: f64) -> bool {
        !self.visible
            || self.min_zoom.is_some_and(|min| zoom < min)
            || self.max_zoom.is_some_and(|max| zoom >= max)
    }

    /// Whether `zoom` lies within the layer's range, both ends inclusive.
    pub fn within_zoom_range(&self, zoom: f64) -> bool {
        self.min_zoom.map_or(true, |min| zoom >= min) && self.max_zoom.map_or(true, |max| zoom <= max)
    }
}

/// Distinct layer roles in style order.
pub fn roles_in_order(layers: &[StyleLayer]) -> Vec<LayerRole> {
    let mut roles = Vec::with_capacity(2);
    for layer in layers {
        if !roles.contains(&layer.role) {
            roles.push(layer.role);
        }
    }
    roles
}

/// The style collaborator.
///
/// Methods take `&self`; implementations use interior mutability because
/// the style is shared between the painter and queued mutations.
pub trait Style: Send + Sync {
    /// Every layer, in paint order.
    fn layers(&self) -> Vec<StyleLayer>;

    /// Resolves once the style document has loaded.
    fn wait_until_ready(&self) -> BoxFuture<'_, ()>;

    /// Set a paint property on a layer.
    fn set_paint_property(&self, layer: &str, property: &str, value: Value);

    /// Set a layout property on a layer.
    fn set_layout_property(&self, layer: &str, property: &str, value: Value);

    /// Replace a layer's filter expression.
    fn set_filter(&self, layer: &str, filter: Value);

    /// Recompute derived state (evaluated properties) for `zoom`.
    fn update(&self, zoom: f64);

    /// Recompute symbol placement before a paint pass.
    fn update_placement(&self) {}

    /// A layer's `paint` object as the style document first defined it.
    ///
    /// Callers use this to undo property changes. Styles not built from a
    /// document return `None`.
    fn original_paint(&self, _layer: &str) -> Option<Value> {
        None
    }

    /// A layer's `layout` object as first defined.
    fn original_layout(&self, _layer: &str) -> Option<Value> {
        None
    }

    /// A layer's `filter` expression as first defined.
    fn original_filter(&self, _layer: &str) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_for_layer_type() {
        assert_eq!(LayerRole::for_layer_type("symbol"), LayerRole::Symbol);
        assert_eq!(LayerRole::for_layer_type("fill"), LayerRole::Other);
        assert_eq!(LayerRole::for_layer_type("raster"), LayerRole::Other);
    }

    #[test]
    fn test_is_hidden_respects_visibility_and_range() {
        let layer = StyleLayer::new("roads", LayerRole::Other, Some("osm"))
            .with_zoom_range(Some(5.0), Some(10.0));
        assert!(layer.is_hidden(4.0));
        assert!(!layer.is_hidden(5.0));
        assert!(!layer.is_hidden(9.5));
        assert!(layer.is_hidden(10.0));

        let mut invisible = StyleLayer::new("labels", LayerRole::Symbol, Some("osm"));
        invisible.visible = false;
        assert!(invisible.is_hidden(7.0));
    }

    #[test]
    fn test_within_zoom_range_is_inclusive() {
        let layer = StyleLayer::new("roads", LayerRole::Other, None)
            .with_zoom_range(Some(5.0), Some(10.0));
        assert!(layer.within_zoom_range(10.0));
        assert!(!layer.within_zoom_range(10.5));
        assert!(StyleLayer::new("bg", LayerRole::Other, None).within_zoom_range(99.0));
    }

    #[test]
    fn test_roles_in_order_deduplicates() {
        let layers = vec![
            StyleLayer::new("labels", LayerRole::Symbol, Some("osm")),
            StyleLayer::new("water", LayerRole::Other, Some("osm")),
            StyleLayer::new("poi", LayerRole::Symbol, Some("osm")),
        ];
        assert_eq!(
            roles_in_order(&layers),
            vec![LayerRole::Symbol, LayerRole::Other]
        );
        assert!(roles_in_order(&[]).is_empty());
    }
}
