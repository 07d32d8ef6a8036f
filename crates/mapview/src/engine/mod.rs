//! Seam to the external rendering engine.
//!
//! The engine loads tiles and styles off-thread but reports completion only
//! through [`EngineEvent`]s, which the host drains and feeds back into the
//! view. Nothing here assumes a style or source mutation is complete when the
//! call returns.

pub mod headless;

use foundation::bounds::{LngLat, LngLatBounds};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::camera::CameraPose;
use crate::popup::PopupContent;

pub type MarkerId = u64;
pub type PopupId = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("layer does not exist: {0}")]
    MissingLayer(String),
    #[error("source does not exist: {0}")]
    MissingSource(String),
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("source {0} is still used by a layer")]
    SourceInUse(String),
    #[error("unknown cluster {cluster_id} in source {source_id}")]
    UnknownCluster { source_id: String, cluster_id: u64 },
    #[error("engine creation failed: {0}")]
    Creation(String),
    #[error("engine has no live surface")]
    NoSurface,
    #[error("style is not done loading")]
    StyleLoading,
}

impl EngineError {
    /// Absence errors are expected during defensive teardown.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            EngineError::MissingLayer(_) | EngineError::MissingSource(_)
        )
    }
}

/// Opaque handle of the display surface the engine binds to (DOM element id,
/// window id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle(pub String);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    Navigation,
    Fullscreen,
    Scale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    pub container: ContainerHandle,
    pub style_url: String,
    pub camera: CameraPose,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub controls: Vec<Control>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FitBoundsOptions {
    pub padding_px: f64,
    pub max_zoom: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cursor {
    Default,
    Pointer,
}

/// A point feature with free-form properties, GeoJSON style.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub position: LngLat,
    pub properties: Map<String, Value>,
}

impl PointFeature {
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn property_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    pub fn is_cluster(&self) -> bool {
        self.properties
            .get("cluster")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn cluster_id(&self) -> Option<u64> {
        self.properties.get("cluster_id").and_then(Value::as_u64)
    }

    pub fn point_count(&self) -> Option<u64> {
        self.properties.get("point_count").and_then(Value::as_u64)
    }

    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": self.position.to_array()},
            "properties": Value::Object(self.properties.clone()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<PointFeature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": self.features.iter().map(PointFeature::to_geojson).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    pub radius_px: f64,
    pub max_zoom: u8,
    pub min_points: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            radius_px: 50.0,
            max_zoom: 14,
            min_points: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub data: FeatureCollection,
    pub cluster: Option<ClusterOptions>,
}

/// Paint/layout values, including the small expression subset the map layers
/// need.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintValue {
    Number(f64),
    Color(String),
    Text(String),
    Get(String),
    Round(Box<PaintValue>),
    ToText(Box<PaintValue>),
    Step {
        input: Box<PaintValue>,
        base: Box<PaintValue>,
        stops: Vec<(f64, PaintValue)>,
    },
}

impl PaintValue {
    pub fn color(c: &str) -> Self {
        PaintValue::Color(c.to_string())
    }

    pub fn get(prop: &str) -> Self {
        PaintValue::Get(prop.to_string())
    }

    pub fn step(input: PaintValue, base: PaintValue, stops: Vec<(f64, PaintValue)>) -> Self {
        PaintValue::Step {
            input: Box::new(input),
            base: Box::new(base),
            stops,
        }
    }

    /// Mapbox GL style-spec JSON for this value.
    pub fn to_expression(&self) -> Value {
        match self {
            PaintValue::Number(n) => json!(n),
            PaintValue::Color(c) | PaintValue::Text(c) => json!(c),
            PaintValue::Get(p) => json!(["get", p]),
            PaintValue::Round(v) => json!(["round", v.to_expression()]),
            PaintValue::ToText(v) => json!(["to-string", v.to_expression()]),
            PaintValue::Step { input, base, stops } => {
                let mut out = vec![json!("step"), input.to_expression(), base.to_expression()];
                for (at, v) in stops {
                    out.push(json!(at));
                    out.push(v.to_expression());
                }
                Value::Array(out)
            }
        }
    }

    /// Evaluates against feature properties. `None` when an input is missing
    /// or has the wrong type.
    pub fn evaluate(&self, properties: &Map<String, Value>) -> Option<Value> {
        match self {
            PaintValue::Number(n) => Some(json!(n)),
            PaintValue::Color(c) | PaintValue::Text(c) => Some(json!(c)),
            PaintValue::Get(p) => properties.get(p).cloned(),
            PaintValue::Round(v) => Some(json!(v.evaluate(properties)?.as_f64()?.round())),
            PaintValue::ToText(v) => Some(match v.evaluate(properties)? {
                Value::String(s) => Value::String(s),
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Value::String(format!("{}", f as i64)),
                    _ => Value::String(n.to_string()),
                },
                other => Value::String(other.to_string()),
            }),
            PaintValue::Step { input, base, stops } => {
                let x = input.evaluate(properties)?.as_f64()?;
                let mut chosen = base.as_ref();
                for (at, v) in stops {
                    if x >= *at {
                        chosen = v;
                    }
                }
                chosen.evaluate(properties)
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerKind {
    Circle,
    Symbol,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerFilter {
    Has(String),
    NotHas(String),
}

impl LayerFilter {
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        match self {
            LayerFilter::Has(p) => properties.contains_key(p),
            LayerFilter::NotHas(p) => !properties.contains_key(p),
        }
    }

    pub fn to_expression(&self) -> Value {
        match self {
            LayerFilter::Has(p) => json!(["has", p]),
            LayerFilter::NotHas(p) => json!(["!", ["has", p]]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
    pub filter: Option<LayerFilter>,
    pub paint: Vec<(String, PaintValue)>,
    pub layout: Vec<(String, PaintValue)>,
}

impl LayerSpec {
    pub fn paint(&self, name: &str) -> Option<&PaintValue> {
        self.paint.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn to_style_json(&self) -> Value {
        let kind = match self.kind {
            LayerKind::Circle => "circle",
            LayerKind::Symbol => "symbol",
        };
        let props = |entries: &[(String, PaintValue)]| {
            Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_expression()))
                    .collect(),
            )
        };
        let mut out = json!({
            "id": self.id,
            "type": kind,
            "source": self.source,
            "paint": props(&self.paint),
            "layout": props(&self.layout),
        });
        if let Some(filter) = &self.filter {
            out["filter"] = filter.to_expression();
        }
        out
    }
}

/// Visual encoding of a DOM-style marker. Sized in screen pixels, so it does
/// not scale with zoom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerVisual {
    pub size_px: f64,
    pub color: String,
    pub gradient: [String; 2],
    pub label: String,
    pub pulse: bool,
    pub scale: f64,
    pub z_index: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub position: LngLat,
    pub visual: MarkerVisual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The engine finished its initial load.
    Load,
    /// Initialization or resource failure.
    Error(String),
    /// A style replacement finished loading.
    StyleLoaded,
    SourceData {
        source: String,
    },
    LayerClick {
        layer: String,
        feature: PointFeature,
    },
    LayerHover {
        layer: String,
        entered: bool,
    },
    MarkerClick(MarkerId),
    MarkerHover {
        marker: MarkerId,
        hovered: bool,
    },
    /// The user dismissed a popup.
    PopupClosed(PopupId),
    /// An action control embedded in popup content was pressed.
    PopupAction {
        control: u64,
        record_id: String,
    },
}

/// Operations the view needs from a map rendering engine.
pub trait MapEngine {
    /// Starts creating the surface. Completion arrives as `Load` or `Error`.
    fn create(&mut self, options: &SurfaceOptions) -> Result<(), EngineError>;
    fn remove(&mut self);

    /// Replaces the whole style. Custom sources and layers are gone when this
    /// returns; the new style is usable after `StyleLoaded`.
    fn set_style(&mut self, url: &str);

    fn camera(&self) -> CameraPose;
    fn jump_to(&mut self, pose: CameraPose);
    fn ease_to(&mut self, center: LngLat, zoom: f64);
    fn fit_bounds(&mut self, bounds: LngLatBounds, options: FitBoundsOptions);

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError>;
    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), EngineError>;
    fn remove_source(&mut self, id: &str) -> Result<(), EngineError>;

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), EngineError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError>;
    fn set_paint_property(
        &mut self,
        layer: &str,
        name: &str,
        value: PaintValue,
    ) -> Result<(), EngineError>;

    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, EngineError>;

    fn add_marker(&mut self, spec: MarkerSpec) -> MarkerId;
    fn update_marker(&mut self, id: MarkerId, visual: &MarkerVisual) -> Result<(), EngineError>;
    fn remove_marker(&mut self, id: MarkerId);

    /// Opens a popup no wider than `max_width_px`.
    fn open_popup(&mut self, at: LngLat, content: &PopupContent, max_width_px: f64) -> PopupId;
    /// Programmatic close. Does not report `PopupClosed`.
    fn close_popup(&mut self, id: PopupId);

    fn set_cursor(&mut self, cursor: Cursor);

    fn drain_events(&mut self) -> Vec<EngineEvent>;
}

#[cfg(test)]
mod tests {
    use super::{LayerFilter, PaintValue};
    use serde_json::{Map, Value, json};

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn step_expression_matches_style_spec_shape() {
        let v = PaintValue::step(
            PaintValue::get("point_count"),
            PaintValue::color("#51bbd6"),
            vec![(10.0, PaintValue::color("#f1f075"))],
        );
        assert_eq!(
            v.to_expression(),
            json!(["step", ["get", "point_count"], "#51bbd6", 10.0, "#f1f075"])
        );
    }

    #[test]
    fn step_evaluates_highest_reached_stop() {
        let v = PaintValue::step(
            PaintValue::get("score"),
            PaintValue::Number(1.0),
            vec![(40.0, PaintValue::Number(2.0)), (80.0, PaintValue::Number(3.0))],
        );
        assert_eq!(v.evaluate(&props(json!({"score": 39}))), Some(json!(1.0)));
        assert_eq!(v.evaluate(&props(json!({"score": 40}))), Some(json!(2.0)));
        assert_eq!(v.evaluate(&props(json!({"score": 95.5}))), Some(json!(3.0)));
        assert_eq!(v.evaluate(&props(json!({}))), None);
    }

    #[test]
    fn rounded_text_label() {
        let v = PaintValue::ToText(Box::new(PaintValue::Round(Box::new(PaintValue::get("score")))));
        assert_eq!(v.evaluate(&props(json!({"score": 84.6}))), Some(json!("85")));
    }

    #[test]
    fn has_filters() {
        let p = props(json!({"point_count": 3}));
        assert!(LayerFilter::Has("point_count".into()).matches(&p));
        assert!(!LayerFilter::NotHas("point_count".into()).matches(&p));
    }
}
