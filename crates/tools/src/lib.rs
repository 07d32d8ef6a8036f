//! Offline rendering of a record set through the headless engine.

use std::collections::BTreeMap;

use foundation::bounds::LngLat;
use mapview::cluster::SOURCE_ID;
use mapview::engine::MapEngine;
use mapview::engine::headless::HeadlessEngine;
use mapview::{CameraPose, MapConfig, MapStyle, MapView, RenderMode};
use records::{BusinessRecord, FilterCriteria, ScoreTier};
use serde::Serialize;
use tracing::debug;

pub const ENV_STYLE: &str = "SCOREMAP_STYLE";
pub const ENV_RENDER_MODE: &str = "SCOREMAP_RENDER_MODE";
pub const ENV_CLUSTER_THRESHOLD: &str = "SCOREMAP_CLUSTER_THRESHOLD";

const DEFAULT_CLUSTER_THRESHOLD: usize = 100;

/// Parses `markers`, `clusters` or `auto`. `auto` uses `threshold`.
pub fn parse_render_mode(s: &str, threshold: usize) -> Option<RenderMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "markers" => Some(RenderMode::Markers),
        "clusters" => Some(RenderMode::Clusters),
        "auto" => Some(RenderMode::Auto {
            cluster_threshold: threshold,
        }),
        _ => None,
    }
}

/// Layers `SCOREMAP_*` overrides onto `config`. Unparseable values are
/// ignored.
pub fn apply_env_overrides(config: &mut MapConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(style) = lookup(ENV_STYLE).and_then(|v| MapStyle::parse(&v)) {
        config.style = style;
    }
    let threshold = lookup(ENV_CLUSTER_THRESHOLD)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(match config.render_mode {
            RenderMode::Auto { cluster_threshold } => cluster_threshold,
            _ => DEFAULT_CLUSTER_THRESHOLD,
        });
    if let Some(mode) = lookup(ENV_RENDER_MODE).and_then(|v| parse_render_mode(&v, threshold)) {
        config.render_mode = mode;
    } else if let RenderMode::Auto { .. } = config.render_mode {
        config.render_mode = RenderMode::Auto {
            cluster_threshold: threshold,
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub position: LngLat,
    pub point_count: u64,
}

/// What a render produced, for printing.
#[derive(Debug, Clone, Serialize)]
pub struct RenderSnapshot {
    pub style: MapStyle,
    pub render_mode: RenderMode,
    pub clustered: bool,
    pub records_total: usize,
    pub records_rendered: usize,
    pub markers: usize,
    pub tiers: BTreeMap<&'static str, usize>,
    pub camera: CameraPose,
    pub clusters: Vec<ClusterSummary>,
    pub unclustered_points: usize,
    pub diagnostics: Vec<String>,
    pub counters: BTreeMap<&'static str, u64>,
}

/// Renders `records` headlessly and reports the resulting state.
pub fn render_snapshot(
    records: Vec<BusinessRecord>,
    criteria: FilterCriteria,
    config: MapConfig,
) -> Result<RenderSnapshot, String> {
    let records_total = records.len();
    let style = config.style;
    let mut view = MapView::new(HeadlessEngine::new(), config);
    view.initialize().map_err(|e| e.to_string())?;
    view.pump().map_err(|e| e.to_string())?;
    view.set_records(records);
    view.set_filter(criteria);
    view.pump().map_err(|e| e.to_string())?;

    let rendered = view.rendered_dataset().cloned().unwrap_or_default();
    let mut tiers: BTreeMap<&'static str, usize> = BTreeMap::new();
    for r in rendered.iter() {
        *tiers.entry(ScoreTier::from_score(r.score).as_str()).or_default() += 1;
    }

    let mut clusters = Vec::new();
    let mut unclustered_points = 0;
    if view.is_clustered() {
        for f in view.engine().rendered_features(SOURCE_ID) {
            match f.point_count() {
                Some(point_count) if f.is_cluster() => clusters.push(ClusterSummary {
                    position: f.position,
                    point_count,
                }),
                _ => unclustered_points += 1,
            }
        }
    }
    debug!(
        clusters = clusters.len(),
        unclustered_points, "cluster features at current zoom"
    );

    let snapshot = view.metrics().snapshot();
    Ok(RenderSnapshot {
        style,
        render_mode: view.render_mode(),
        clustered: view.is_clustered(),
        records_total,
        records_rendered: rendered.len(),
        markers: view.marker_count(),
        tiers,
        camera: view.engine().camera(),
        clusters,
        unclustered_points,
        diagnostics: view
            .diagnostics()
            .iter()
            .map(|d| format!("{}: {}", d.kind, d.message))
            .collect(),
        counters: snapshot.counters.into_iter().collect(),
    })
}
