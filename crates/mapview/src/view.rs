//! The orchestrator: filters records, picks a rendering path and routes engine
//! events to the component that owns them.

use std::rc::Rc;

use foundation::time::Time;
use records::{BusinessRecord, FilterCriteria, FilteredDataset, RecordId, filter_records};
use runtime::{Envelope, EventBus, Metrics, SubscriptionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterClick, ClusterEngine};
use crate::config::MapConfig;
use crate::engine::{ContainerHandle, EngineEvent, MapEngine};
use crate::error::{Diagnostic, MapError};
use crate::markers::{MarkerRenderer, fit_camera_to};
use crate::popup::{
    ActivePopup, CompareHandler, DispatchOutcome, PopupActionKind, PopupController, SelectHandler,
};
use crate::style::{MapStyle, StyleManager};
use crate::surface::{MapSurface, SurfaceHandle, SurfaceSettings, SurfaceState, SurfaceTransition};

/// Which rendering path a dataset goes through.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Markers,
    Clusters,
    /// Clusters once the dataset grows past `cluster_threshold` records.
    Auto { cluster_threshold: usize },
}

impl RenderMode {
    pub fn uses_clusters(self, len: usize) -> bool {
        match self {
            RenderMode::Markers => false,
            RenderMode::Clusters => true,
            RenderMode::Auto { cluster_threshold } => len > cluster_threshold,
        }
    }
}

/// Notifications for consumers outside the selection callback chain.
#[derive(Debug, Clone, PartialEq)]
pub enum MapNotification {
    ClusterPointClicked { record_id: RecordId },
    CompareRequested { record: BusinessRecord },
}

#[derive(Debug, Clone, PartialEq)]
struct Rendered {
    dataset: FilteredDataset,
    clustered: bool,
}

fn noop_handler() -> Rc<dyn Fn(&BusinessRecord)> {
    Rc::new(|_: &BusinessRecord| {})
}

pub struct MapView<E: MapEngine> {
    config: MapConfig,
    surface: MapSurface<E>,
    styles: StyleManager,
    clusters: ClusterEngine,
    markers: MarkerRenderer,
    popups: PopupController,
    notifications: EventBus<MapNotification>,
    metrics: Metrics,
    diagnostics: Vec<Diagnostic>,
    on_select: SelectHandler,
    on_compare: CompareHandler,
    records: Vec<BusinessRecord>,
    criteria: FilterCriteria,
    render_mode: RenderMode,
    rendered: Option<Rendered>,
    dirty: bool,
    now: Time,
}

impl<E: MapEngine> std::fmt::Debug for MapView<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("state", self.surface.state())
            .field("style", &self.styles.current_style())
            .field("render_mode", &self.render_mode)
            .field("records", &self.records.len())
            .field("markers", &self.markers)
            .field("clusters", &self.clusters)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<E: MapEngine> MapView<E> {
    pub fn new(engine: E, config: MapConfig) -> Self {
        let settings = SurfaceSettings {
            style_url: config.styles.url_for(config.style).to_string(),
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
        };
        Self {
            surface: MapSurface::new(engine, settings),
            styles: StyleManager::new(config.styles.clone(), config.style),
            clusters: ClusterEngine::new(config.cluster),
            markers: MarkerRenderer::new(config.markers.clone()),
            popups: PopupController::new(config.popup.clone()),
            notifications: EventBus::new(),
            metrics: Metrics::new(),
            diagnostics: Vec::new(),
            on_select: noop_handler(),
            on_compare: noop_handler(),
            records: Vec::new(),
            criteria: FilterCriteria::all(),
            render_mode: config.render_mode,
            rendered: None,
            dirty: false,
            now: Time::ZERO,
            config,
        }
    }

    pub fn with_handlers(mut self, on_select: SelectHandler, on_compare: CompareHandler) -> Self {
        self.on_select = on_select;
        self.on_compare = on_compare;
        self
    }

    pub fn initialize(&mut self) -> Result<SurfaceHandle, MapError> {
        self.surface.initialize(
            ContainerHandle(self.config.container.clone()),
            self.config.camera,
        )
    }

    /// Replaces the full record set. Rendering catches up on the next flush.
    pub fn set_records(&mut self, records: Vec<BusinessRecord>) {
        self.records = records;
        self.dirty = true;
    }

    pub fn set_filter(&mut self, criteria: FilterCriteria) {
        if criteria != self.criteria {
            self.criteria = criteria;
            self.dirty = true;
        }
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        if mode != self.render_mode {
            self.render_mode = mode;
            self.dirty = true;
        }
    }

    pub fn set_style(&mut self, style: MapStyle) -> Result<bool, MapError> {
        self.styles.set_style(&mut self.surface, style)
    }

    /// Rebuilds render state if anything changed since the last rebuild.
    /// Returns `true` when a rebuild ran.
    ///
    /// Does nothing until the surface is ready; pending changes are kept.
    pub fn flush(&mut self) -> Result<bool, MapError> {
        if !self.dirty || !self.surface.is_ready() {
            return Ok(false);
        }
        let dataset = filter_records(&self.records, &self.criteria);
        let clustered = self.render_mode.uses_clusters(dataset.len());
        let next = Rendered { dataset, clustered };
        if self.rendered.as_ref() == Some(&next) {
            self.dirty = false;
            self.metrics.inc("rebuilds_skipped");
            debug!("filtered dataset unchanged; skipping rebuild");
            return Ok(false);
        }
        // The cluster source cannot be touched until the new style loads.
        if next.clustered && self.styles.is_switching() {
            debug!("style switch pending; deferring cluster rebuild");
            return Ok(false);
        }

        if next.clustered {
            self.markers.clear_markers(&mut self.surface, &mut self.popups);
            self.clusters
                .update_clusters(&mut self.surface, &next.dataset, self.on_select.clone())?;
            if !next.dataset.is_empty() {
                fit_camera_to(
                    self.surface.engine_mut()?,
                    &next.dataset,
                    &self.config.markers,
                );
            }
        } else {
            if self.clusters.is_active() {
                self.clusters.clear_clusters(&mut self.surface)?;
            }
            let created = self.markers.update_markers(
                &mut self.surface,
                &mut self.popups,
                &next.dataset,
                self.on_select.clone(),
            )?;
            self.metrics.inc_by("markers_created", created as u64);
        }

        self.metrics.inc("rebuilds");
        self.metrics
            .set_gauge("markers", self.markers.marker_count() as i64);
        self.metrics
            .set_gauge("cluster_features", self.clusters.feature_count() as i64);
        info!(
            records = next.dataset.len(),
            clustered = next.clustered,
            "render state rebuilt"
        );
        self.rendered = Some(next);
        self.dirty = false;
        Ok(true)
    }

    /// Routes one engine event.
    pub fn handle_event(&mut self, event: EngineEvent) -> Result<(), MapError> {
        match event {
            EngineEvent::Load | EngineEvent::Error(_) => self.on_lifecycle(&event),
            EngineEvent::StyleLoaded => {
                let diagnostics = self.styles.on_style_loaded(&mut self.surface);
                self.diagnostics.extend(diagnostics);
                if self.clusters.on_style_loaded(&mut self.surface)? {
                    debug!("cluster source restored after style switch");
                }
            }
            EngineEvent::SourceData { source } => {
                debug!(source = %source, "source data applied");
            }
            EngineEvent::LayerClick { layer, feature } => {
                match self
                    .clusters
                    .handle_click(&mut self.surface, &layer, &feature)?
                {
                    ClusterClick::Expanded { .. } => self.metrics.inc("clusters_expanded"),
                    ClusterClick::Selected(record) => self.notifications.publish(
                        self.now,
                        MapNotification::ClusterPointClicked {
                            record_id: record.id,
                        },
                    ),
                    ClusterClick::Ignored => {}
                }
            }
            EngineEvent::LayerHover { layer, entered } => {
                self.clusters
                    .handle_hover(&mut self.surface, &layer, entered);
            }
            EngineEvent::MarkerClick(marker) => {
                let opened = self.markers.on_marker_click(
                    &mut self.surface,
                    &mut self.popups,
                    marker,
                    self.on_compare.clone(),
                    self.now,
                )?;
                if opened.is_some() {
                    self.metrics.inc("popups_opened");
                }
            }
            EngineEvent::MarkerHover { marker, hovered } => {
                self.markers
                    .on_marker_hover(&mut self.surface, marker, hovered)?;
            }
            EngineEvent::PopupClosed(popup) => {
                self.popups.on_popup_closed(popup);
            }
            EngineEvent::PopupAction { control, record_id } => {
                self.invoke_popup_action(control, &record_id);
            }
        }
        Ok(())
    }

    fn on_lifecycle(&mut self, event: &EngineEvent) {
        match self.surface.on_event(event) {
            Some(SurfaceTransition::Ready) => {
                let diagnostics = self.styles.on_surface_ready(&mut self.surface);
                self.diagnostics.extend(diagnostics);
            }
            Some(SurfaceTransition::Failed(msg)) => {
                self.diagnostics.push(Diagnostic::new("surface", msg));
            }
            None => {
                if let EngineEvent::Error(msg) = event {
                    warn!("map engine error: {msg}");
                    self.diagnostics.push(Diagnostic::new("engine", msg.clone()));
                }
            }
        }
    }

    /// Handles every pending engine event, then flushes. Returns the number
    /// of events handled.
    pub fn pump(&mut self) -> Result<usize, MapError> {
        let mut handled = 0;
        loop {
            let events = self.surface.drain_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                if let Err(e) = self.handle_event(event) {
                    warn!("engine event failed: {e}");
                    self.diagnostics.push(Diagnostic::new("event", e.to_string()));
                }
                handled += 1;
            }
        }
        self.flush()?;
        Ok(handled)
    }

    /// Advances host time. Returns `true` if the popup was auto-dismissed.
    pub fn tick(&mut self, now: Time) -> bool {
        self.now = now;
        let dismissed = self.popups.tick(&mut self.surface, now);
        if dismissed {
            self.metrics.inc("popups_auto_dismissed");
        }
        dismissed
    }

    /// Resolves a pressed popup control. Compare requests are also published
    /// as notifications.
    pub fn invoke_popup_action(&mut self, control: u64, record_id: &str) -> DispatchOutcome {
        let outcome = self.popups.dispatch(control, record_id);
        match &outcome {
            DispatchOutcome::Invoked {
                kind: PopupActionKind::Compare,
                record,
            } => self.notifications.publish(
                self.now,
                MapNotification::CompareRequested {
                    record: record.clone(),
                },
            ),
            DispatchOutcome::Invoked { .. } => {}
            DispatchOutcome::Stale => self.metrics.inc("stale_dispatches"),
        }
        outcome
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&MapNotification) + 'static) -> SubscriptionId {
        self.notifications.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifications.unsubscribe(id)
    }

    pub fn drain_notifications(&mut self) -> Vec<Envelope<MapNotification>> {
        self.notifications.drain()
    }

    /// Tears everything down and releases the surface. Safe to call twice.
    pub fn destroy(&mut self) {
        if *self.surface.state() == SurfaceState::Destroyed {
            return;
        }
        self.popups.close(&mut self.surface);
        self.markers.clear_markers(&mut self.surface, &mut self.popups);
        let diagnostics = self.clusters.destroy(&mut self.surface);
        self.diagnostics.extend(diagnostics);
        self.surface.destroy();
        self.rendered = None;
        self.dirty = false;
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn state(&self) -> &SurfaceState {
        self.surface.state()
    }

    pub fn surface(&self) -> &MapSurface<E> {
        &self.surface
    }

    pub fn engine(&self) -> &E {
        self.surface.raw_engine()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.surface.raw_engine_mut()
    }

    pub fn records(&self) -> &[BusinessRecord] {
        &self.records
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn current_style(&self) -> MapStyle {
        self.styles.current_style()
    }

    pub fn available_styles(&self) -> &'static [MapStyle] {
        self.styles.available_styles()
    }

    /// Dataset of the last rebuild.
    pub fn rendered_dataset(&self) -> Option<&FilteredDataset> {
        self.rendered.as_ref().map(|r| &r.dataset)
    }

    pub fn is_clustered(&self) -> bool {
        self.rendered.as_ref().is_some_and(|r| r.clustered)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn markers(&self) -> &MarkerRenderer {
        &self.markers
    }

    pub fn marker_count(&self) -> usize {
        self.markers.marker_count()
    }

    pub fn cluster_feature_count(&self) -> usize {
        self.clusters.feature_count()
    }

    pub fn active_popup(&self) -> Option<&ActivePopup> {
        self.popups.active()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::{MapNotification, MapView, RenderMode};
    use crate::cluster::{CLUSTER_LAYER, SOURCE_ID};
    use crate::config::MapConfig;
    use crate::style::MapStyle;
    use crate::engine::headless::{HeadlessEngine, JournalEntry};
    use crate::engine::MapEngine;
    use records::{BusinessRecord, FilterCriteria};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn records() -> Vec<BusinessRecord> {
        vec![
            BusinessRecord::new("1", "Cafe", 85.0)
                .with_position(45.50, -73.60)
                .with_sector("Food")
                .with_city("Montreal"),
            BusinessRecord::new("2", "Garage", 45.0)
                .with_position(45.52, -73.58)
                .with_sector("Auto")
                .with_city("Montreal"),
            BusinessRecord::new("3", "Bakery", 65.0)
                .with_position(46.81, -71.21)
                .with_sector("Food")
                .with_city("Quebec"),
        ]
    }

    fn ready_view() -> MapView<HeadlessEngine> {
        let mut view = MapView::new(HeadlessEngine::new(), MapConfig::default());
        view.initialize().unwrap();
        view.pump().unwrap();
        view
    }

    #[test]
    fn auto_mode_switches_on_threshold() {
        let mode = RenderMode::Auto {
            cluster_threshold: 2,
        };
        assert!(!mode.uses_clusters(2));
        assert!(mode.uses_clusters(3));
        assert!(!RenderMode::Markers.uses_clusters(10_000));
    }

    #[test]
    fn changes_before_ready_render_after_load() {
        let mut view = MapView::new(HeadlessEngine::new(), MapConfig::default());
        view.set_records(records());
        assert!(!view.flush().unwrap());
        view.initialize().unwrap();
        view.pump().unwrap();
        assert_eq!(view.marker_count(), 3);
        assert!(!view.is_dirty());
    }

    #[test]
    fn burst_of_filter_changes_rebuilds_once() {
        let mut view = ready_view();
        view.set_records(records());
        view.flush().unwrap();
        view.engine_mut().clear_journal();

        view.set_filter(FilterCriteria::all().sector("Auto"));
        view.set_filter(FilterCriteria::all().city("Quebec"));
        view.set_filter(FilterCriteria::all().sector("Food"));
        assert!(view.flush().unwrap());
        assert_eq!(view.metrics().counter("rebuilds"), 2);

        let added = view
            .engine()
            .journal()
            .iter()
            .filter(|e| matches!(e, JournalEntry::MarkerAdded(_)))
            .count();
        assert_eq!(added, 2);
    }

    #[test]
    fn unchanged_dataset_skips_rebuild() {
        let mut view = ready_view();
        view.set_records(records());
        view.flush().unwrap();
        view.set_filter(FilterCriteria::all().score_range(Some(0.0), Some(100.0)));
        assert!(!view.flush().unwrap());
        assert_eq!(view.metrics().counter("rebuilds_skipped"), 1);
        assert_eq!(view.marker_count(), 3);
    }

    #[test]
    fn switching_to_clusters_clears_markers() {
        let mut view = ready_view();
        view.set_records(records());
        view.flush().unwrap();
        view.set_render_mode(RenderMode::Clusters);
        view.flush().unwrap();
        assert_eq!(view.marker_count(), 0);
        assert!(view.engine().markers().is_empty());
        assert_eq!(view.cluster_feature_count(), 3);

        view.set_render_mode(RenderMode::Markers);
        view.flush().unwrap();
        assert_eq!(view.cluster_feature_count(), 0);
        assert_eq!(view.marker_count(), 3);
    }

    #[test]
    fn cluster_rebuild_waits_for_style_load() {
        let mut view = ready_view();
        view.set_render_mode(RenderMode::Clusters);
        view.set_records(records());
        view.pump().unwrap();
        assert_eq!(view.cluster_feature_count(), 3);

        assert!(view.set_style(MapStyle::Dark).unwrap());
        view.set_filter(FilterCriteria::all().sector("Food"));
        assert!(!view.flush().unwrap());
        assert!(view.is_dirty());
        let journal = view.engine().journal();
        let style_set = journal
            .iter()
            .rposition(|e| matches!(e, JournalEntry::StyleSet(_)))
            .unwrap();
        assert!(
            !journal[style_set..]
                .iter()
                .any(|e| matches!(e, JournalEntry::SourceData { .. }))
        );

        view.pump().unwrap();
        assert!(!view.is_dirty());
        assert_eq!(view.engine().source_data(SOURCE_ID).unwrap().len(), 2);
        assert!(view.engine().has_layer(CLUSTER_LAYER));
        assert_eq!(view.cluster_feature_count(), 2);
    }

    #[test]
    fn compare_action_publishes_notification() {
        let mut view = ready_view();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        view.subscribe(move |n: &MapNotification| sink.borrow_mut().push(n.clone()));
        view.set_records(records());
        view.flush().unwrap();

        let marker = view.markers().handles()[0].marker;
        view.engine_mut().click_marker(marker);
        view.pump().unwrap();
        let popup = view.active_popup().unwrap().popup;
        assert!(view.engine_mut().press_popup_action(popup, 1));
        view.pump().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            MapNotification::CompareRequested { record } if record.id == "1"
        ));
    }

    #[test]
    fn destroy_twice_is_fine() {
        let mut view = ready_view();
        view.set_records(records());
        view.flush().unwrap();
        view.destroy();
        view.destroy();
        assert!(view.engine().is_removed());
        view.set_filter(FilterCriteria::all().sector("Food"));
        assert!(!view.flush().unwrap());
    }
}
