//! Individual DOM-style markers, one per record, colored by score tier.

use std::collections::HashMap;

use foundation::time::Time;
use records::{BusinessRecord, FilteredDataset, ScoreTier};
use tracing::{debug, info};

use crate::config::MarkerConfig;
use crate::engine::{FitBoundsOptions, MapEngine, MarkerId, MarkerSpec, MarkerVisual};
use crate::error::MapError;
use crate::popup::{CompareHandler, PopupContent, PopupController, SelectHandler};
use crate::surface::MapSurface;

/// Fixed color treatment of a score tier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TierStyle {
    pub color: &'static str,
    pub gradient: [&'static str; 2],
}

pub fn tier_style(tier: ScoreTier) -> TierStyle {
    match tier {
        ScoreTier::High => TierStyle {
            color: "#22c55e",
            gradient: ["#4ade80", "#15803d"],
        },
        ScoreTier::Medium => TierStyle {
            color: "#3b82f6",
            gradient: ["#60a5fa", "#1d4ed8"],
        },
        ScoreTier::Low => TierStyle {
            color: "#f59e0b",
            gradient: ["#fbbf24", "#b45309"],
        },
        ScoreTier::Minimal => TierStyle {
            color: "#ef4444",
            gradient: ["#f87171", "#b91c1c"],
        },
    }
}

pub fn marker_visual(record: &BusinessRecord, config: &MarkerConfig) -> MarkerVisual {
    let tier = ScoreTier::from_score(record.score);
    let style = tier_style(tier);
    let label = if record.score.is_finite() {
        format!("{:.0}", record.score)
    } else {
        "?".to_string()
    };
    MarkerVisual {
        size_px: config.size_px,
        color: style.color.to_string(),
        gradient: style.gradient.map(str::to_string),
        label,
        pulse: tier.pulses(),
        scale: 1.0,
        z_index: config.z_index,
    }
}

/// Render state for one record.
#[derive(Debug, Clone)]
pub struct MarkerHandle {
    pub record: BusinessRecord,
    pub marker: MarkerId,
    pub tier: ScoreTier,
    pub visual: MarkerVisual,
    pub popup: PopupContent,
    pub hovered: bool,
}

/// Fits the camera to the dataset's envelope. Large datasets get a lower zoom
/// ceiling so coinciding points don't pull the camera into one street.
pub(crate) fn fit_camera_to<E: MapEngine>(
    engine: &mut E,
    dataset: &FilteredDataset,
    config: &MarkerConfig,
) -> bool {
    let Some(bounds) = dataset.bounds() else {
        return false;
    };
    let max_zoom = if dataset.len() > config.many_records_threshold {
        config.many_max_zoom
    } else {
        config.few_max_zoom
    };
    engine.fit_bounds(
        bounds,
        FitBoundsOptions {
            padding_px: config.fit_padding_px,
            max_zoom,
        },
    );
    true
}

#[derive(Default)]
pub struct MarkerRenderer {
    config: MarkerConfig,
    handles: Vec<MarkerHandle>,
    by_marker: HashMap<MarkerId, usize>,
    on_select: Option<SelectHandler>,
}

impl std::fmt::Debug for MarkerRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerRenderer")
            .field("markers", &self.handles.len())
            .finish()
    }
}

impl MarkerRenderer {
    pub fn new(config: MarkerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn marker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn handles(&self) -> &[MarkerHandle] {
        &self.handles
    }

    pub fn handle(&self, marker: MarkerId) -> Option<&MarkerHandle> {
        self.by_marker.get(&marker).map(|&i| &self.handles[i])
    }

    /// Replaces every marker with one per record in `dataset`, then fits the
    /// camera. An empty dataset leaves the camera alone.
    pub fn update_markers<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        popups: &mut PopupController,
        dataset: &FilteredDataset,
        on_select: SelectHandler,
    ) -> Result<usize, MapError> {
        surface.engine()?;
        self.clear_markers(surface, popups);
        self.on_select = Some(on_select);

        let engine = surface.engine_mut()?;
        for record in dataset.iter() {
            let Some(position) = record.position() else {
                continue;
            };
            let visual = marker_visual(record, &self.config);
            let marker = engine.add_marker(MarkerSpec {
                position,
                visual: visual.clone(),
            });
            self.by_marker.insert(marker, self.handles.len());
            self.handles.push(MarkerHandle {
                record: record.clone(),
                marker,
                tier: ScoreTier::from_score(record.score),
                visual,
                popup: PopupContent::for_record(record),
                hovered: false,
            });
        }

        if !dataset.is_empty() {
            fit_camera_to(engine, dataset, &self.config);
        }
        info!(markers = self.handles.len(), "markers rebuilt");
        Ok(self.handles.len())
    }

    /// Removes every marker. Closes the active popup when it belongs to one of
    /// them.
    pub fn clear_markers<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        popups: &mut PopupController,
    ) {
        if self.handles.is_empty() {
            return;
        }
        let owns_popup = popups
            .active_record_id()
            .is_some_and(|id| self.handles.iter().any(|h| h.record.id == id));
        if owns_popup {
            popups.close(surface);
        }
        if let Ok(engine) = surface.engine_mut() {
            for handle in &self.handles {
                engine.remove_marker(handle.marker);
            }
        }
        debug!(removed = self.handles.len(), "markers cleared");
        self.handles.clear();
        self.by_marker.clear();
    }

    /// Promotes the marker's popup to the active one, then selects its record.
    /// Returns the record, or `None` for an unknown marker.
    pub fn on_marker_click<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        popups: &mut PopupController,
        marker: MarkerId,
        on_compare: CompareHandler,
        now: Time,
    ) -> Result<Option<BusinessRecord>, MapError> {
        let Some(&i) = self.by_marker.get(&marker) else {
            return Ok(None);
        };
        let Some(on_select) = self.on_select.clone() else {
            return Ok(None);
        };
        let handle = &self.handles[i];
        let Some(at) = handle.record.position() else {
            return Ok(None);
        };
        let record = handle.record.clone();
        popups.open(
            surface,
            &record,
            handle.popup.clone(),
            at,
            on_select.clone(),
            on_compare,
            now,
        )?;
        on_select(&record);
        Ok(Some(record))
    }

    /// Scales the marker up and raises it while hovered.
    pub fn on_marker_hover<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        marker: MarkerId,
        hovered: bool,
    ) -> Result<bool, MapError> {
        let Some(&i) = self.by_marker.get(&marker) else {
            return Ok(false);
        };
        let handle = &mut self.handles[i];
        if handle.hovered == hovered {
            return Ok(false);
        }
        handle.hovered = hovered;
        if hovered {
            handle.visual.scale = self.config.hover_scale;
            handle.visual.z_index = self.config.hover_z_index;
        } else {
            handle.visual.scale = 1.0;
            handle.visual.z_index = self.config.z_index;
        }
        surface
            .engine_mut()?
            .update_marker(handle.marker, &handle.visual)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{MarkerRenderer, tier_style};
    use crate::camera::CameraPose;
    use crate::config::{MarkerConfig, PopupConfig};
    use crate::engine::ContainerHandle;
    use crate::engine::MapEngine;
    use crate::engine::headless::{HeadlessEngine, JournalEntry};
    use crate::popup::{PopupController, SelectHandler};
    use crate::surface::{MapSurface, SurfaceSettings};
    use foundation::time::Time;
    use records::{BusinessRecord, FilteredDataset, ScoreTier};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ready_surface() -> MapSurface<HeadlessEngine> {
        let mut s = MapSurface::new(
            HeadlessEngine::new(),
            SurfaceSettings {
                style_url: "mapbox://styles/mapbox/light-v11".into(),
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

    fn dataset(n: usize) -> FilteredDataset {
        FilteredDataset::from_records((0..n).map(|i| {
            BusinessRecord::new(i.to_string(), format!("Biz {i}"), (i % 100) as f64)
                .with_position(45.4 + (i as f64) * 0.001, -73.7 + (i as f64) * 0.001)
        }))
    }

    fn noop() -> SelectHandler {
        Rc::new(|_: &BusinessRecord| {})
    }

    #[test]
    fn tiers_have_distinct_colors() {
        let colors: Vec<_> = [
            ScoreTier::High,
            ScoreTier::Medium,
            ScoreTier::Low,
            ScoreTier::Minimal,
        ]
        .into_iter()
        .map(|t| tier_style(t).color)
        .collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn update_is_full_teardown() {
        let mut s = ready_surface();
        let mut popups = PopupController::new(PopupConfig::default());
        let mut markers = MarkerRenderer::new(MarkerConfig::default());

        markers
            .update_markers(&mut s, &mut popups, &dataset(5), noop())
            .unwrap();
        s.raw_engine_mut().clear_journal();
        markers
            .update_markers(&mut s, &mut popups, &dataset(3), noop())
            .unwrap();

        let journal = s.raw_engine().journal();
        let removed = journal
            .iter()
            .filter(|e| matches!(e, JournalEntry::MarkerRemoved(_)))
            .count();
        let first_add = journal
            .iter()
            .position(|e| matches!(e, JournalEntry::MarkerAdded(_)))
            .unwrap();
        let last_remove = journal
            .iter()
            .rposition(|e| matches!(e, JournalEntry::MarkerRemoved(_)))
            .unwrap();
        assert_eq!(removed, 5);
        assert!(last_remove < first_add);
        assert_eq!(markers.marker_count(), 3);
        assert_eq!(s.raw_engine().markers().len(), 3);
    }

    #[test]
    fn zoom_ceiling_depends_on_dataset_size() {
        let mut s = ready_surface();
        let mut popups = PopupController::new(PopupConfig::default());
        let mut markers = MarkerRenderer::new(MarkerConfig::default());

        markers
            .update_markers(&mut s, &mut popups, &dataset(150), noop())
            .unwrap();
        assert!(s.raw_engine().camera().zoom <= 10.0);

        markers
            .update_markers(&mut s, &mut popups, &dataset(2), noop())
            .unwrap();
        assert!(s.raw_engine().camera().zoom <= 13.0);
        assert!(s.raw_engine().camera().zoom > 10.0);
    }

    #[test]
    fn empty_dataset_keeps_camera() {
        let mut s = ready_surface();
        let mut popups = PopupController::new(PopupConfig::default());
        let mut markers = MarkerRenderer::new(MarkerConfig::default());
        let before = s.raw_engine().camera();
        markers
            .update_markers(&mut s, &mut popups, &FilteredDataset::empty(), noop())
            .unwrap();
        assert_eq!(s.raw_engine().camera(), before);
        assert_eq!(markers.marker_count(), 0);
    }

    #[test]
    fn click_opens_popup_and_selects() {
        let mut s = ready_surface();
        let mut popups = PopupController::new(PopupConfig::default());
        let mut markers = MarkerRenderer::new(MarkerConfig::default());
        let picked = Rc::new(RefCell::new(Vec::new()));
        let sink = picked.clone();
        markers
            .update_markers(
                &mut s,
                &mut popups,
                &dataset(3),
                Rc::new(move |r: &BusinessRecord| sink.borrow_mut().push(r.id.clone())),
            )
            .unwrap();

        let id = markers.handles()[1].marker;
        let record = markers
            .on_marker_click(&mut s, &mut popups, id, noop(), Time(0.0))
            .unwrap()
            .unwrap();
        assert_eq!(record.id, "1");
        assert_eq!(*picked.borrow(), vec!["1".to_string()]);
        assert_eq!(popups.active_record_id(), Some("1"));

        markers.clear_markers(&mut s, &mut popups);
        markers.clear_markers(&mut s, &mut popups);
        assert!(popups.active().is_none());
        assert!(s.raw_engine().popups().is_empty());
    }

    #[test]
    fn hover_scales_and_raises() {
        let mut s = ready_surface();
        let mut popups = PopupController::new(PopupConfig::default());
        let mut markers = MarkerRenderer::new(MarkerConfig::default());
        markers
            .update_markers(&mut s, &mut popups, &dataset(1), noop())
            .unwrap();
        let id = markers.handles()[0].marker;

        assert!(markers.on_marker_hover(&mut s, id, true).unwrap());
        assert!(!markers.on_marker_hover(&mut s, id, true).unwrap());
        let visual = &s.raw_engine().markers()[&id].visual;
        assert_eq!(visual.scale, 1.25);
        assert_eq!(visual.z_index, 1000);
        assert_eq!(visual.size_px, 36.0);

        markers.on_marker_hover(&mut s, id, false).unwrap();
        assert_eq!(s.raw_engine().markers()[&id].visual.z_index, 1);
    }
}
