//! Clustered rendering path: one clustered point source plus four layers.

use records::{BusinessRecord, FilteredDataset, ScoreTier};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::engine::{
    ClusterOptions, Cursor, EngineError, FeatureCollection, LayerFilter, LayerKind, LayerSpec,
    MapEngine, PaintValue, PointFeature, SourceSpec,
};
use crate::error::{Diagnostic, MapError};
use crate::markers::tier_style;
use crate::popup::SelectHandler;
use crate::surface::MapSurface;

pub const SOURCE_ID: &str = "businesses";
pub const CLUSTER_LAYER: &str = "business-clusters";
pub const CLUSTER_COUNT_LAYER: &str = "business-cluster-count";
pub const POINT_LAYER: &str = "business-points";
pub const POINT_SCORE_LAYER: &str = "business-point-score";

const LAYERS: [&str; 4] = [
    CLUSTER_LAYER,
    CLUSTER_COUNT_LAYER,
    POINT_LAYER,
    POINT_SCORE_LAYER,
];

/// The only properties a clustered point carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterPointProps<'a> {
    pub id: &'a str,
    pub score: f64,
    pub name: &'a str,
    pub city: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
}

impl<'a> ClusterPointProps<'a> {
    pub fn of(record: &'a BusinessRecord) -> Self {
        Self {
            id: &record.id,
            score: record.score,
            name: &record.name,
            city: &record.city,
            rating: record.rating,
            review_count: record.review_count,
        }
    }

    fn into_properties(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// One point feature per renderable record, in dataset order.
pub fn cluster_features(dataset: &FilteredDataset) -> FeatureCollection {
    FeatureCollection {
        features: dataset
            .iter()
            .filter_map(|r| {
                Some(PointFeature {
                    position: r.position()?,
                    properties: ClusterPointProps::of(r).into_properties(),
                })
            })
            .collect(),
    }
}

fn score_color() -> PaintValue {
    let c = |t| PaintValue::color(tier_style(t).color);
    PaintValue::step(
        PaintValue::get("score"),
        c(ScoreTier::Minimal),
        vec![
            (ScoreTier::LOW_MIN, c(ScoreTier::Low)),
            (ScoreTier::MEDIUM_MIN, c(ScoreTier::Medium)),
            (ScoreTier::HIGH_MIN, c(ScoreTier::High)),
        ],
    )
}

/// Layer definitions for the clustered source, bottom to top.
pub fn cluster_layers() -> Vec<LayerSpec> {
    let has_count = || Some(LayerFilter::Has("point_count".to_string()));
    let no_count = || Some(LayerFilter::NotHas("point_count".to_string()));
    let s = |k: &str| k.to_string();
    vec![
        LayerSpec {
            id: s(CLUSTER_LAYER),
            kind: LayerKind::Circle,
            source: s(SOURCE_ID),
            filter: has_count(),
            paint: vec![
                (
                    s("circle-color"),
                    PaintValue::step(
                        PaintValue::get("point_count"),
                        PaintValue::color("#51bbd6"),
                        vec![
                            (10.0, PaintValue::color("#f1f075")),
                            (50.0, PaintValue::color("#f28cb1")),
                        ],
                    ),
                ),
                (
                    s("circle-radius"),
                    PaintValue::step(
                        PaintValue::get("point_count"),
                        PaintValue::Number(18.0),
                        vec![(10.0, PaintValue::Number(26.0)), (50.0, PaintValue::Number(36.0))],
                    ),
                ),
                (s("circle-stroke-width"), PaintValue::Number(2.0)),
                (s("circle-stroke-color"), PaintValue::color("#ffffff")),
            ],
            layout: Vec::new(),
        },
        LayerSpec {
            id: s(CLUSTER_COUNT_LAYER),
            kind: LayerKind::Symbol,
            source: s(SOURCE_ID),
            filter: has_count(),
            paint: vec![(s("text-color"), PaintValue::color("#1f2937"))],
            layout: vec![
                (s("text-field"), PaintValue::get("point_count_abbreviated")),
                (s("text-size"), PaintValue::Number(12.0)),
            ],
        },
        LayerSpec {
            id: s(POINT_LAYER),
            kind: LayerKind::Circle,
            source: s(SOURCE_ID),
            filter: no_count(),
            paint: vec![
                (s("circle-color"), score_color()),
                (s("circle-radius"), PaintValue::Number(12.0)),
                (s("circle-stroke-width"), PaintValue::Number(2.0)),
                (s("circle-stroke-color"), PaintValue::color("#ffffff")),
            ],
            layout: Vec::new(),
        },
        LayerSpec {
            id: s(POINT_SCORE_LAYER),
            kind: LayerKind::Symbol,
            source: s(SOURCE_ID),
            filter: no_count(),
            paint: vec![(s("text-color"), PaintValue::color("#ffffff"))],
            layout: vec![
                (
                    s("text-field"),
                    PaintValue::ToText(Box::new(PaintValue::Round(Box::new(PaintValue::get(
                        "score",
                    ))))),
                ),
                (s("text-size"), PaintValue::Number(10.0)),
            ],
        },
    ]
}

/// What a click on a cluster-path layer did.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterClick {
    Expanded { cluster_id: u64, zoom: f64 },
    Selected(BusinessRecord),
    Ignored,
}

#[derive(Default)]
pub struct ClusterEngine {
    options: ClusterOptions,
    active: bool,
    dataset: FilteredDataset,
    features: FeatureCollection,
    on_select: Option<SelectHandler>,
}

impl std::fmt::Debug for ClusterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterEngine")
            .field("options", &self.options)
            .field("active", &self.active)
            .field("features", &self.features.len())
            .finish()
    }
}

impl ClusterEngine {
    pub fn new(options: ClusterOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Features currently pushed to the source.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Replaces the source data with `dataset`. The first call creates the
    /// source and its layers.
    pub fn update_clusters<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        dataset: &FilteredDataset,
        on_select: SelectHandler,
    ) -> Result<usize, MapError> {
        let engine = surface.engine_mut()?;
        let features = cluster_features(dataset);
        if engine.has_source(SOURCE_ID) {
            engine.set_source_data(SOURCE_ID, features.clone())?;
        } else {
            self.install(engine, features.clone())?;
        }
        self.active = true;
        self.dataset = dataset.clone();
        self.features = features;
        self.on_select = Some(on_select);
        debug!(features = self.features.len(), "cluster source updated");
        Ok(self.features.len())
    }

    fn install<E: MapEngine>(
        &self,
        engine: &mut E,
        data: FeatureCollection,
    ) -> Result<(), EngineError> {
        engine.add_source(
            SOURCE_ID,
            SourceSpec {
                data,
                cluster: Some(self.options),
            },
        )?;
        for layer in cluster_layers() {
            if !engine.has_layer(&layer.id) {
                engine.add_layer(layer)?;
            }
        }
        info!(
            radius_px = self.options.radius_px,
            max_zoom = self.options.max_zoom,
            "cluster source installed"
        );
        Ok(())
    }

    /// Empties the source so the marker path can render alone.
    pub fn clear_clusters<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
    ) -> Result<(), MapError> {
        self.dataset = FilteredDataset::empty();
        self.features = FeatureCollection::empty();
        let engine = surface.engine_mut()?;
        if engine.has_source(SOURCE_ID) {
            engine.set_source_data(SOURCE_ID, FeatureCollection::empty())?;
        }
        Ok(())
    }

    /// Re-creates the source after a style replacement wiped it.
    pub fn on_style_loaded<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
    ) -> Result<bool, MapError> {
        if !self.active {
            return Ok(false);
        }
        let engine = surface.engine_mut()?;
        if engine.has_source(SOURCE_ID) {
            return Ok(false);
        }
        self.install(engine, self.features.clone())?;
        Ok(true)
    }

    /// Removes the layers and the source. Anything already gone is skipped.
    pub fn destroy<E: MapEngine>(&mut self, surface: &mut MapSurface<E>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.active = false;
        self.dataset = FilteredDataset::empty();
        self.features = FeatureCollection::empty();
        self.on_select = None;
        let Ok(engine) = surface.engine_mut() else {
            return diagnostics;
        };
        let mut note = |result: Result<(), EngineError>| {
            if let Err(e) = result {
                if !e.is_missing() {
                    warn!("cluster teardown: {e}");
                    diagnostics.push(Diagnostic::new("cluster", e.to_string()));
                }
            }
        };
        for layer in LAYERS.iter().rev() {
            note(engine.remove_layer(layer));
        }
        note(engine.remove_source(SOURCE_ID));
        diagnostics
    }

    /// Clicking a cluster eases in past its expansion zoom; clicking a point
    /// selects its record.
    pub fn handle_click<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        layer: &str,
        feature: &PointFeature,
    ) -> Result<ClusterClick, MapError> {
        match layer {
            CLUSTER_LAYER | CLUSTER_COUNT_LAYER if feature.is_cluster() => {
                let Some(cluster_id) = feature.cluster_id() else {
                    return Ok(ClusterClick::Ignored);
                };
                let engine = surface.engine_mut()?;
                let expansion = engine.cluster_expansion_zoom(SOURCE_ID, cluster_id)?;
                let zoom = expansion + 1.0;
                engine.ease_to(feature.position, zoom);
                debug!(cluster_id, zoom, "cluster expanded");
                Ok(ClusterClick::Expanded { cluster_id, zoom })
            }
            POINT_LAYER | POINT_SCORE_LAYER => {
                let record = feature
                    .property_str("id")
                    .and_then(|id| self.dataset.find(id))
                    .cloned();
                match (record, &self.on_select) {
                    (Some(record), Some(on_select)) => {
                        on_select(&record);
                        Ok(ClusterClick::Selected(record))
                    }
                    _ => Ok(ClusterClick::Ignored),
                }
            }
            _ => Ok(ClusterClick::Ignored),
        }
    }

    /// Pointer cursor over clickable cluster-path layers.
    pub fn handle_hover<E: MapEngine>(
        &self,
        surface: &mut MapSurface<E>,
        layer: &str,
        entered: bool,
    ) -> bool {
        if !LAYERS.contains(&layer) {
            return false;
        }
        let Ok(engine) = surface.engine_mut() else {
            return false;
        };
        engine.set_cursor(if entered {
            Cursor::Pointer
        } else {
            Cursor::Default
        });
        true
    }
}
