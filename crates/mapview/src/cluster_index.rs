//! Hierarchical greedy point clustering over Web Mercator, one level per
//! integer zoom.
//!
//! Level `max_zoom + 1` holds the raw points. Each lower level is built from
//! the one above by merging nodes that fall within `radius_px` screen pixels of
//! each other at that zoom.

use foundation::math::{TILE_SIZE_PX, Vec2, project, unproject};
use serde_json::{Value, json};

use crate::engine::{ClusterOptions, FeatureCollection, PointFeature};

#[derive(Debug, Clone)]
struct Node {
    pos: Vec2,
    num_points: usize,
    /// Raw point index for leaf pass-throughs.
    point: Option<usize>,
    /// Set for nodes that aggregate more than one point.
    cluster_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClusterIndex {
    options: ClusterOptions,
    points: Vec<PointFeature>,
    levels: Vec<Vec<Node>>,
}

fn encode_id(index: usize, zoom: usize) -> u64 {
    ((index as u64) << 5) | zoom as u64
}

fn decode_id(id: u64) -> (usize, usize) {
    ((id >> 5) as usize, (id & 0x1f) as usize)
}

impl ClusterIndex {
    pub fn build(options: ClusterOptions, data: &FeatureCollection) -> Self {
        let max_zoom = options.max_zoom.min(30) as usize;
        let points = data.features.clone();

        let leaves: Vec<Node> = points
            .iter()
            .enumerate()
            .map(|(i, f)| Node {
                pos: project(f.position),
                num_points: 1,
                point: Some(i),
                cluster_id: None,
            })
            .collect();

        let mut levels: Vec<Vec<Node>> = vec![Vec::new(); max_zoom + 2];
        levels[max_zoom + 1] = leaves;

        for zoom in (0..=max_zoom).rev() {
            let next = cluster_level(&levels[zoom + 1], zoom, &options);
            levels[zoom] = next;
        }

        Self {
            options,
            points,
            levels,
        }
    }

    pub fn options(&self) -> ClusterOptions {
        self.options
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    fn level_for(&self, zoom: f64) -> usize {
        let top = self.levels.len() - 1;
        if !zoom.is_finite() || zoom < 0.0 {
            return 0;
        }
        (zoom.floor() as usize).min(top)
    }

    /// Clusters and unclustered points visible at `zoom`.
    pub fn features_at(&self, zoom: f64) -> Vec<PointFeature> {
        self.levels[self.level_for(zoom)]
            .iter()
            .map(|node| self.node_feature(node))
            .collect()
    }

    fn node_feature(&self, node: &Node) -> PointFeature {
        match (node.cluster_id, node.point) {
            (Some(id), _) => {
                let mut properties = serde_json::Map::new();
                properties.insert("cluster".into(), Value::Bool(true));
                properties.insert("cluster_id".into(), json!(id));
                properties.insert("point_count".into(), json!(node.num_points));
                properties.insert(
                    "point_count_abbreviated".into(),
                    json!(abbreviate(node.num_points)),
                );
                PointFeature {
                    position: unproject(node.pos),
                    properties,
                }
            }
            (None, Some(i)) => self.points[i].clone(),
            (None, None) => PointFeature {
                position: unproject(node.pos),
                properties: serde_json::Map::new(),
            },
        }
    }

    /// Zoom at which the cluster splits into its children.
    pub fn expansion_zoom(&self, cluster_id: u64) -> Option<f64> {
        let (index, zoom) = decode_id(cluster_id);
        let node = self.levels.get(zoom)?.get(index)?;
        if node.cluster_id != Some(cluster_id) {
            return None;
        }
        Some((zoom + 1) as f64)
    }
}

fn cluster_level(prev: &[Node], zoom: usize, options: &ClusterOptions) -> Vec<Node> {
    let r = options.radius_px / (TILE_SIZE_PX * 2f64.powi(zoom as i32));
    let r2 = r * r;
    let min_points = options.min_points.max(2);

    let mut taken = vec![false; prev.len()];
    let mut out = Vec::with_capacity(prev.len());

    for i in 0..prev.len() {
        if taken[i] {
            continue;
        }
        taken[i] = true;
        let p = &prev[i];

        let neighbors: Vec<usize> = (i + 1..prev.len())
            .filter(|&j| !taken[j] && prev[j].pos.distance_sq(p.pos) <= r2)
            .collect();
        let total: usize = p.num_points + neighbors.iter().map(|&j| prev[j].num_points).sum::<usize>();

        if neighbors.is_empty() || total < min_points {
            out.push(p.clone());
            continue;
        }

        let mut weighted = p.pos * p.num_points as f64;
        for &j in &neighbors {
            taken[j] = true;
            weighted = weighted + prev[j].pos * prev[j].num_points as f64;
        }
        let id = encode_id(out.len(), zoom);
        out.push(Node {
            pos: weighted * (1.0 / total as f64),
            num_points: total,
            point: None,
            cluster_id: Some(id),
        });
    }

    out
}

fn abbreviate(n: usize) -> String {
    if n >= 10_000 {
        format!("{}k", n / 1000)
    } else if n >= 1000 {
        format!("{:.1}k", n as f64 / 1000.0)
    } else {
        n.to_string()
    }
}
