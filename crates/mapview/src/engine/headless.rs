//! Deterministic in-process engine.
//!
//! Keeps the whole render state in memory, queues the same completion events a
//! browser engine would emit, and journals every visible mutation so ordering
//! can be checked after the fact. Used by the CLI and by tests.

use std::collections::{BTreeMap, VecDeque};

use foundation::bounds::{LngLat, LngLatBounds};
use foundation::math::{projected_center, zoom_to_fit};

use super::{
    ClusterOptions, Control, Cursor, EngineError, EngineEvent, FeatureCollection, FitBoundsOptions,
    LayerSpec, MapEngine, MarkerId, MarkerSpec, MarkerVisual, PaintValue, PointFeature, PopupId,
    SourceSpec, SurfaceOptions,
};
use crate::camera::CameraPose;
use crate::cluster_index::ClusterIndex;
use crate::popup::PopupContent;

/// Visible mutations, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    StyleSet(String),
    MarkerAdded(MarkerId),
    MarkerRemoved(MarkerId),
    PopupOpened { popup: PopupId, record_id: String },
    PopupClosed(PopupId),
    FitBounds { bounds: LngLatBounds, max_zoom: f64 },
    EaseTo { center: LngLat, zoom: f64 },
    SourceData { source: String, features: usize },
}

#[derive(Debug, Clone)]
struct Source {
    data: FeatureCollection,
    cluster: Option<ClusterOptions>,
    index: Option<ClusterIndex>,
}

impl Source {
    fn new(spec: SourceSpec) -> Self {
        let mut s = Self {
            data: spec.data,
            cluster: spec.cluster,
            index: None,
        };
        s.reindex();
        s
    }

    fn reindex(&mut self) {
        self.index = self.cluster.map(|opts| ClusterIndex::build(opts, &self.data));
    }
}

#[derive(Debug, Clone)]
pub struct OpenPopup {
    pub position: LngLat,
    pub content: PopupContent,
    pub max_width_px: f64,
}

/// Base layer ids of the bundled styles. Imagery styles have no vector water
/// layer.
pub fn base_layers_for(style_url: &str) -> Vec<String> {
    let ids: &[&str] = if style_url.contains("satellite") {
        &["satellite", "road-primary", "road-secondary", "road-label", "place-label"]
    } else {
        &[
            "background",
            "water",
            "landuse",
            "road-primary",
            "road-secondary",
            "road-label",
            "place-label",
        ]
    };
    ids.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug)]
pub struct HeadlessEngine {
    viewport_px: [f64; 2],
    fail_with: Option<String>,
    created: bool,
    removed: bool,
    style_url: Option<String>,
    style_loading: bool,
    base_layers: Vec<String>,
    layers: Vec<LayerSpec>,
    sources: BTreeMap<String, Source>,
    paint: BTreeMap<(String, String), PaintValue>,
    camera: CameraPose,
    min_zoom: f64,
    max_zoom: f64,
    controls: Vec<Control>,
    markers: BTreeMap<MarkerId, MarkerSpec>,
    next_marker: MarkerId,
    popups: BTreeMap<PopupId, OpenPopup>,
    next_popup: PopupId,
    cursor: Cursor,
    events: VecDeque<EngineEvent>,
    journal: Vec<JournalEntry>,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            viewport_px: [1024.0, 768.0],
            fail_with: None,
            created: false,
            removed: false,
            style_url: None,
            style_loading: false,
            base_layers: Vec::new(),
            layers: Vec::new(),
            sources: BTreeMap::new(),
            paint: BTreeMap::new(),
            camera: CameraPose::default(),
            min_zoom: 0.0,
            max_zoom: 22.0,
            controls: Vec::new(),
            markers: BTreeMap::new(),
            next_marker: 1,
            popups: BTreeMap::new(),
            next_popup: 1,
            cursor: Cursor::Default,
            events: VecDeque::new(),
            journal: Vec::new(),
        }
    }

    /// An engine whose asynchronous load fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new()
        }
    }

    pub fn with_viewport(mut self, width_px: f64, height_px: f64) -> Self {
        self.viewport_px = [width_px, height_px];
        self
    }

    pub fn viewport_px(&self) -> [f64; 2] {
        self.viewport_px
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// True between `set_style` and the drain that delivers `StyleLoaded`.
    pub fn is_style_loading(&self) -> bool {
        self.style_loading
    }

    pub fn style_url(&self) -> Option<&str> {
        self.style_url.as_deref()
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.base_layers
            .iter()
            .cloned()
            .chain(self.layers.iter().map(|l| l.id.clone()))
            .collect()
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn paint_property(&self, layer: &str, name: &str) -> Option<&PaintValue> {
        self.paint
            .get(&(layer.to_string(), name.to_string()))
            .or_else(|| self.layer(layer).and_then(|l| l.paint(name)))
    }

    pub fn source_data(&self, id: &str) -> Option<&FeatureCollection> {
        self.sources.get(id).map(|s| &s.data)
    }

    /// Clusters and points of a clustered source as drawn at the current zoom.
    pub fn rendered_features(&self, source: &str) -> Vec<PointFeature> {
        match self.sources.get(source) {
            Some(Source {
                index: Some(index), ..
            }) => index.features_at(self.camera.zoom),
            Some(s) => s.data.features.clone(),
            None => Vec::new(),
        }
    }

    pub fn markers(&self) -> &BTreeMap<MarkerId, MarkerSpec> {
        &self.markers
    }

    pub fn popups(&self) -> &BTreeMap<PopupId, OpenPopup> {
        &self.popups
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    // Simulated user input. Each queues the event a browser engine would emit.

    pub fn click_marker(&mut self, id: MarkerId) {
        self.events.push_back(EngineEvent::MarkerClick(id));
    }

    pub fn hover_marker(&mut self, id: MarkerId, hovered: bool) {
        self.events.push_back(EngineEvent::MarkerHover {
            marker: id,
            hovered,
        });
    }

    pub fn click_feature(&mut self, layer: &str, feature: PointFeature) {
        self.events.push_back(EngineEvent::LayerClick {
            layer: layer.to_string(),
            feature,
        });
    }

    pub fn hover_layer(&mut self, layer: &str, entered: bool) {
        self.events.push_back(EngineEvent::LayerHover {
            layer: layer.to_string(),
            entered,
        });
    }

    /// The user pressed the close button of a popup.
    pub fn dismiss_popup(&mut self, id: PopupId) {
        if self.popups.remove(&id).is_some() {
            self.journal.push(JournalEntry::PopupClosed(id));
            self.events.push_back(EngineEvent::PopupClosed(id));
        }
    }

    /// The user pressed action `index` inside popup `id`. Returns `false` when
    /// there is no such popup or action.
    pub fn press_popup_action(&mut self, id: PopupId, index: usize) -> bool {
        let Some(popup) = self.popups.get(&id) else {
            return false;
        };
        let Some(action) = popup.content.actions.get(index) else {
            return false;
        };
        self.events.push_back(EngineEvent::PopupAction {
            control: action.control,
            record_id: popup.content.record_id.clone(),
        });
        true
    }

    fn check_style_loaded(&self) -> Result<(), EngineError> {
        if self.style_loading {
            return Err(EngineError::StyleLoading);
        }
        Ok(())
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

impl MapEngine for HeadlessEngine {
    fn create(&mut self, options: &SurfaceOptions) -> Result<(), EngineError> {
        if options.container.0.trim().is_empty() {
            return Err(EngineError::Creation("empty container id".to_string()));
        }
        self.created = true;
        self.min_zoom = options.min_zoom;
        self.max_zoom = options.max_zoom;
        self.camera = options.camera;
        self.controls = options.controls.clone();
        self.style_url = Some(options.style_url.clone());
        self.base_layers = base_layers_for(&options.style_url);

        match &self.fail_with {
            Some(msg) => self.events.push_back(EngineEvent::Error(msg.clone())),
            None => self.events.push_back(EngineEvent::Load),
        }
        Ok(())
    }

    fn remove(&mut self) {
        self.removed = true;
        self.layers.clear();
        self.sources.clear();
        self.markers.clear();
        self.popups.clear();
        self.events.clear();
    }

    fn set_style(&mut self, url: &str) {
        self.style_url = Some(url.to_string());
        self.style_loading = true;
        self.base_layers = base_layers_for(url);
        self.layers.clear();
        self.sources.clear();
        self.paint.clear();
        self.journal.push(JournalEntry::StyleSet(url.to_string()));
        self.events.push_back(EngineEvent::StyleLoaded);
    }

    fn camera(&self) -> CameraPose {
        self.camera
    }

    fn jump_to(&mut self, pose: CameraPose) {
        self.camera = CameraPose {
            zoom: self.clamp_zoom(pose.zoom),
            ..pose
        };
    }

    fn ease_to(&mut self, center: LngLat, zoom: f64) {
        let zoom = self.clamp_zoom(zoom);
        self.camera.center = center;
        self.camera.zoom = zoom;
        self.journal.push(JournalEntry::EaseTo { center, zoom });
    }

    fn fit_bounds(&mut self, bounds: LngLatBounds, options: FitBoundsOptions) {
        let fit = zoom_to_fit(&bounds, self.viewport_px, options.padding_px);
        let ceiling = options.max_zoom.min(self.max_zoom);
        let zoom = fit.min(ceiling).max(self.min_zoom);
        self.camera.center = projected_center(&bounds);
        self.camera.zoom = zoom;
        self.journal.push(JournalEntry::FitBounds {
            bounds,
            max_zoom: options.max_zoom,
        });
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError> {
        self.check_style_loaded()?;
        if self.sources.contains_key(id) {
            return Err(EngineError::Duplicate {
                kind: "source",
                id: id.to_string(),
            });
        }
        let features = spec.data.len();
        self.sources.insert(id.to_string(), Source::new(spec));
        self.journal.push(JournalEntry::SourceData {
            source: id.to_string(),
            features,
        });
        self.events.push_back(EngineEvent::SourceData {
            source: id.to_string(),
        });
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), EngineError> {
        self.check_style_loaded()?;
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| EngineError::MissingSource(id.to_string()))?;
        let features = data.len();
        source.data = data;
        source.reindex();
        self.journal.push(JournalEntry::SourceData {
            source: id.to_string(),
            features,
        });
        self.events.push_back(EngineEvent::SourceData {
            source: id.to_string(),
        });
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        if self.layers.iter().any(|l| l.source == id) {
            return Err(EngineError::SourceInUse(id.to_string()));
        }
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::MissingSource(id.to_string()))
    }

    fn has_layer(&self, id: &str) -> bool {
        self.base_layers.iter().any(|l| l == id) || self.layers.iter().any(|l| l.id == id)
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), EngineError> {
        self.check_style_loaded()?;
        if self.has_layer(&layer.id) {
            return Err(EngineError::Duplicate {
                kind: "layer",
                id: layer.id,
            });
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(EngineError::MissingSource(layer.source));
        }
        self.layers.push(layer);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        if self.layers.len() == before {
            return Err(EngineError::MissingLayer(id.to_string()));
        }
        self.paint.retain(|(layer, _), _| layer != id);
        Ok(())
    }

    fn set_paint_property(
        &mut self,
        layer: &str,
        name: &str,
        value: PaintValue,
    ) -> Result<(), EngineError> {
        self.check_style_loaded()?;
        if !self.has_layer(layer) {
            return Err(EngineError::MissingLayer(layer.to_string()));
        }
        self.paint
            .insert((layer.to_string(), name.to_string()), value);
        Ok(())
    }

    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, EngineError> {
        let index = self
            .sources
            .get(source)
            .and_then(|s| s.index.as_ref())
            .ok_or_else(|| EngineError::MissingSource(source.to_string()))?;
        index
            .expansion_zoom(cluster_id)
            .ok_or_else(|| EngineError::UnknownCluster {
                source_id: source.to_string(),
                cluster_id,
            })
    }

    fn add_marker(&mut self, spec: MarkerSpec) -> MarkerId {
        let id = self.next_marker;
        self.next_marker += 1;
        self.markers.insert(id, spec);
        self.journal.push(JournalEntry::MarkerAdded(id));
        id
    }

    fn update_marker(&mut self, id: MarkerId, visual: &MarkerVisual) -> Result<(), EngineError> {
        let marker = self
            .markers
            .get_mut(&id)
            .ok_or_else(|| EngineError::MissingLayer(format!("marker {id}")))?;
        marker.visual = visual.clone();
        Ok(())
    }

    fn remove_marker(&mut self, id: MarkerId) {
        if self.markers.remove(&id).is_some() {
            self.journal.push(JournalEntry::MarkerRemoved(id));
        }
    }

    fn open_popup(&mut self, at: LngLat, content: &PopupContent, max_width_px: f64) -> PopupId {
        let id = self.next_popup;
        self.next_popup += 1;
        self.popups.insert(
            id,
            OpenPopup {
                position: at,
                content: content.clone(),
                max_width_px,
            },
        );
        self.journal.push(JournalEntry::PopupOpened {
            popup: id,
            record_id: content.record_id.clone(),
        });
        id
    }

    fn close_popup(&mut self, id: PopupId) {
        if self.popups.remove(&id).is_some() {
            self.journal.push(JournalEntry::PopupClosed(id));
        }
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        let events: Vec<EngineEvent> = self.events.drain(..).collect();
        if events.contains(&EngineEvent::StyleLoaded) {
            self.style_loading = false;
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::{HeadlessEngine, JournalEntry, base_layers_for};
    use crate::camera::CameraPose;
    use crate::engine::{
        ContainerHandle, EngineError, EngineEvent, FeatureCollection, FitBoundsOptions, MapEngine,
        PaintValue, SourceSpec, SurfaceOptions,
    };
    use foundation::bounds::{LngLat, LngLatBounds};

    fn created() -> HeadlessEngine {
        let mut e = HeadlessEngine::new();
        e.create(&SurfaceOptions {
            container: ContainerHandle("map".into()),
            style_url: "mapbox://styles/mapbox/light-v11".into(),
            camera: CameraPose::default(),
            min_zoom: 0.0,
            max_zoom: 20.0,
            controls: Vec::new(),
        })
        .unwrap();
        e
    }

    #[test]
    fn create_queues_load() {
        let mut e = created();
        assert_eq!(e.drain_events(), vec![EngineEvent::Load]);
        assert!(e.has_layer("water"));
    }

    #[test]
    fn empty_container_is_rejected_synchronously() {
        let mut e = HeadlessEngine::new();
        let err = e
            .create(&SurfaceOptions {
                container: ContainerHandle(" ".into()),
                style_url: "x".into(),
                camera: CameraPose::default(),
                min_zoom: 0.0,
                max_zoom: 20.0,
                controls: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Creation(_)));
    }

    #[test]
    fn style_replacement_wipes_paint_and_queues_style_loaded() {
        let mut e = created();
        e.drain_events();
        e.set_paint_property("water", "fill-color", PaintValue::color("#000"))
            .unwrap();
        e.set_style("mapbox://styles/mapbox/satellite-streets-v12");
        assert!(!e.has_layer("water"));
        assert!(e.paint_property("water", "fill-color").is_none());
        assert_eq!(e.drain_events(), vec![EngineEvent::StyleLoaded]);
        assert!(matches!(
            e.set_paint_property("water", "fill-color", PaintValue::color("#000")),
            Err(EngineError::MissingLayer(_))
        ));
    }

    #[test]
    fn sources_are_rejected_until_style_loaded_is_drained() {
        let mut e = created();
        e.drain_events();
        e.set_style("mapbox://styles/mapbox/dark-v11");
        assert!(e.is_style_loading());
        let spec = || SourceSpec {
            data: FeatureCollection::empty(),
            cluster: None,
        };
        assert_eq!(e.add_source("pts", spec()), Err(EngineError::StyleLoading));
        assert_eq!(
            e.set_paint_property("water", "fill-color", PaintValue::color("#000")),
            Err(EngineError::StyleLoading)
        );

        assert_eq!(e.drain_events(), vec![EngineEvent::StyleLoaded]);
        assert!(!e.is_style_loading());
        e.add_source("pts", spec()).unwrap();
        assert!(e.has_source("pts"));
    }

    #[test]
    fn fit_bounds_respects_ceiling() {
        let mut e = created();
        let b = LngLatBounds::from_point(LngLat::new(-73.6, 45.5));
        e.fit_bounds(
            b,
            FitBoundsOptions {
                padding_px: 50.0,
                max_zoom: 13.0,
            },
        );
        assert_eq!(e.camera().zoom, 13.0);
        assert!(e.camera().center.approx_eq(LngLat::new(-73.6, 45.5), 1e-9));
        assert!(matches!(e.journal().last(), Some(JournalEntry::FitBounds { .. })));
    }

    #[test]
    fn satellite_has_no_water_layer() {
        assert!(!base_layers_for("mapbox://styles/mapbox/satellite-streets-v12")
            .contains(&"water".to_string()));
        assert!(base_layers_for("mapbox://styles/mapbox/dark-v11").contains(&"water".to_string()));
    }
}
