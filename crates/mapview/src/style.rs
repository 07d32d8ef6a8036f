use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::camera::CameraPose;
use crate::config::StyleUrls;
use crate::engine::{MapEngine, PaintValue};
use crate::error::{Diagnostic, MapError};
use crate::surface::MapSurface;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapStyle {
    #[default]
    Light,
    Dark,
    Satellite,
}

impl MapStyle {
    pub const ALL: [MapStyle; 3] = [MapStyle::Light, MapStyle::Dark, MapStyle::Satellite];

    pub fn as_str(self) -> &'static str {
        match self {
            MapStyle::Light => "light",
            MapStyle::Dark => "dark",
            MapStyle::Satellite => "satellite",
        }
    }

    pub fn parse(s: &str) -> Option<MapStyle> {
        MapStyle::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// One paint override applied on top of a base style.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintCustomization {
    pub layer: &'static str,
    pub property: &'static str,
    pub value: PaintValue,
}

fn custom(layer: &'static str, property: &'static str, value: PaintValue) -> PaintCustomization {
    PaintCustomization {
        layer,
        property,
        value,
    }
}

/// Overrides for `style`: water tint, primary road emphasis and label halos.
pub fn customizations(style: MapStyle) -> Vec<PaintCustomization> {
    let (water, road, road_width, halo, halo_width) = match style {
        MapStyle::Light => ("#b3d9f2", "#f6c177", 2.0, "#ffffff", 1.5),
        MapStyle::Dark => ("#0e2a47", "#f0a04b", 2.5, "#111827", 1.5),
        MapStyle::Satellite => ("#1d4e89", "#ffd166", 3.0, "#000000", 2.0),
    };
    vec![
        custom("water", "fill-color", PaintValue::color(water)),
        custom("road-primary", "line-color", PaintValue::color(road)),
        custom("road-primary", "line-width", PaintValue::Number(road_width)),
        custom("place-label", "text-halo-color", PaintValue::color(halo)),
        custom("place-label", "text-halo-width", PaintValue::Number(halo_width)),
        custom("road-label", "text-halo-color", PaintValue::color(halo)),
        custom("road-label", "text-halo-width", PaintValue::Number(halo_width)),
    ]
}

/// Switches base styles and re-applies paint overrides once the new style has
/// loaded, keeping the camera where the user left it.
#[derive(Debug)]
pub struct StyleManager {
    urls: StyleUrls,
    current: MapStyle,
    pending: Option<CameraPose>,
}

impl StyleManager {
    pub fn new(urls: StyleUrls, initial: MapStyle) -> Self {
        Self {
            urls,
            current: initial,
            pending: None,
        }
    }

    pub fn current_style(&self) -> MapStyle {
        self.current
    }

    pub fn available_styles(&self) -> &'static [MapStyle] {
        &MapStyle::ALL
    }

    pub fn url_for(&self, style: MapStyle) -> &str {
        self.urls.url_for(style)
    }

    /// A replacement style was requested and has not loaded yet.
    pub fn is_switching(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests `target`. Returns `false` when it is already current.
    pub fn set_style<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        target: MapStyle,
    ) -> Result<bool, MapError> {
        if target == self.current {
            debug!(style = target.as_str(), "style already active");
            return Ok(false);
        }
        let engine = surface.engine_mut()?;
        // A switch requested mid-switch keeps the pose captured first.
        let pose = self.pending.unwrap_or_else(|| engine.camera());
        engine.set_style(self.urls.url_for(target));
        self.pending = Some(pose);
        info!(from = self.current.as_str(), to = target.as_str(), "switching map style");
        self.current = target;
        Ok(true)
    }

    /// Applies the current style's overrides on the first `StyleLoaded` after
    /// a switch. Overrides whose layer the style lacks are skipped and
    /// reported.
    pub fn on_style_loaded<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
    ) -> Vec<Diagnostic> {
        let Some(pose) = self.pending.take() else {
            return Vec::new();
        };
        let Ok(engine) = surface.engine_mut() else {
            return Vec::new();
        };
        engine.jump_to(pose);
        apply_customizations(engine, self.current)
    }

    /// Applies overrides for the initial style after the surface loads.
    pub fn on_surface_ready<E: MapEngine>(&self, surface: &mut MapSurface<E>) -> Vec<Diagnostic> {
        match surface.engine_mut() {
            Ok(engine) => apply_customizations(engine, self.current),
            Err(_) => Vec::new(),
        }
    }
}

fn apply_customizations<E: MapEngine>(engine: &mut E, style: MapStyle) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for c in customizations(style) {
        if !engine.has_layer(c.layer) {
            warn!(
                style = style.as_str(),
                layer = c.layer,
                property = c.property,
                "style has no such layer; skipping paint override"
            );
            diagnostics.push(Diagnostic::new(
                "style",
                format!(
                    "{} style has no layer {}; {} not applied",
                    style.as_str(),
                    c.layer,
                    c.property
                ),
            ));
            continue;
        }
        if let Err(e) = engine.set_paint_property(c.layer, c.property, c.value) {
            warn!("paint override failed: {e}");
            diagnostics.push(Diagnostic::new("style", e.to_string()));
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::{MapStyle, StyleManager};
    use crate::camera::CameraPose;
    use crate::config::StyleUrls;
    use crate::engine::headless::{HeadlessEngine, JournalEntry};
    use crate::engine::{ContainerHandle, EngineEvent, MapEngine, PaintValue};
    use crate::surface::{MapSurface, SurfaceSettings};
    use foundation::bounds::LngLat;

    fn ready_surface() -> MapSurface<HeadlessEngine> {
        let mut s = MapSurface::new(
            HeadlessEngine::new(),
            SurfaceSettings {
                style_url: StyleUrls::default().light,
                min_zoom: 0.0,
                max_zoom: 20.0,
            },
        );
        s.initialize(ContainerHandle("map".into()), CameraPose::default())
            .unwrap();
        for e in s.drain_events() {
            s.on_event(&e);
        }
        s
    }

    fn finish_load(s: &mut MapSurface<HeadlessEngine>, styles: &mut StyleManager) -> usize {
        let mut diagnostics = 0;
        for e in s.drain_events() {
            if e == EngineEvent::StyleLoaded {
                diagnostics += styles.on_style_loaded(s).len();
            }
        }
        diagnostics
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(MapStyle::parse(" Dark "), Some(MapStyle::Dark));
        assert_eq!(MapStyle::parse("terrain"), None);
    }

    #[test]
    fn same_style_is_a_no_op() {
        let mut s = ready_surface();
        let mut styles = StyleManager::new(StyleUrls::default(), MapStyle::Light);
        assert!(!styles.set_style(&mut s, MapStyle::Light).unwrap());
        assert!(!styles.is_switching());
        assert!(
            !s.raw_engine()
                .journal()
                .iter()
                .any(|e| matches!(e, JournalEntry::StyleSet(_)))
        );
    }

    #[test]
    fn dark_switch_restores_pose_and_tints() {
        let mut s = ready_surface();
        let mut styles = StyleManager::new(StyleUrls::default(), MapStyle::Light);
        let pose = CameraPose {
            center: LngLat::new(-71.2, 46.8),
            zoom: 12.0,
            bearing: 20.0,
            pitch: 30.0,
        };
        s.raw_engine_mut().jump_to(pose);

        assert!(styles.set_style(&mut s, MapStyle::Dark).unwrap());
        assert!(styles.is_switching());
        assert_eq!(finish_load(&mut s, &mut styles), 0);
        assert!(!styles.is_switching());

        let engine = s.raw_engine();
        assert!(engine.camera().approx_eq(&pose, 1e-9));
        assert_eq!(
            engine.paint_property("water", "fill-color"),
            Some(&PaintValue::color("#0e2a47"))
        );
        assert_eq!(
            engine.paint_property("road-primary", "line-width"),
            Some(&PaintValue::Number(2.5))
        );
        assert_eq!(styles.current_style(), MapStyle::Dark);
    }

    #[test]
    fn satellite_skips_missing_water_layer() {
        let mut s = ready_surface();
        let mut styles = StyleManager::new(StyleUrls::default(), MapStyle::Light);
        styles.set_style(&mut s, MapStyle::Satellite).unwrap();
        assert_eq!(finish_load(&mut s, &mut styles), 1);
        let engine = s.raw_engine();
        assert_eq!(engine.paint_property("water", "fill-color"), None);
        assert_eq!(
            engine.paint_property("road-primary", "line-color"),
            Some(&PaintValue::color("#ffd166"))
        );
    }

    #[test]
    fn stray_style_loaded_is_ignored() {
        let mut s = ready_surface();
        let mut styles = StyleManager::new(StyleUrls::default(), MapStyle::Light);
        assert!(styles.on_style_loaded(&mut s).is_empty());
        assert_eq!(s.raw_engine().paint_property("water", "fill-color"), None);
    }
}
