use std::collections::BTreeMap;

use foundation::math::mercator::{lat_y, lng_x, project, unproject};
use foundation::{DeviceId, LngLatBounds};
use thiserror::Error;
use tracing::debug;

use crate::feature::{ClusterFeature, ClusterId, ClusterMember, Partition, SpatialFeature};
use crate::kdtree::KdTree;
use crate::options::{ClusterOptions, fallback_expansion_zoom};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("no cluster with id {0}")]
    NotFound(ClusterId),
    #[error("cluster {0} is a synthetic single-member cluster")]
    Synthetic(ClusterId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    /// Index into the loaded features.
    Point(u32),
    Cluster(u64),
}

#[derive(Debug, Clone)]
struct Node {
    xy: [f64; 2],
    kind: NodeKind,
    num_points: usize,
    /// Cluster this node was absorbed into one level down.
    parent: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct Level {
    nodes: Vec<Node>,
    tree: KdTree,
}

impl Level {
    fn new(nodes: Vec<Node>, node_size: usize) -> Self {
        let xy: Vec<[f64; 2]> = nodes.iter().map(|n| n.xy).collect();
        let tree = KdTree::build(&xy, node_size);
        Self { nodes, tree }
    }
}

/// Hierarchical greedy point clustering over unit Web-Mercator space.
///
/// One level is built per integer zoom from `max_zoom + 1` (raw points) down
/// to `min_zoom`. A query at zoom `z` reads the level at `floor(z)` clamped
/// into that range.
///
/// Ordering contract:
/// - `load` deduplicates by device id (last one wins), drops invalid
///   positions and sorts by device id, so every query result depends only on
///   the feature set and never on input order.
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    options: ClusterOptions,
    features: Vec<SpatialFeature>,
    /// Indexed by zoom; levels below `min_zoom` stay empty.
    levels: Vec<Level>,
}

impl Default for ClusterIndex {
    fn default() -> Self {
        Self::new(ClusterOptions::default())
    }
}

impl ClusterIndex {
    pub fn new(options: ClusterOptions) -> Self {
        Self {
            options: options.sanitized(),
            features: Vec::new(),
            levels: Vec::new(),
        }
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[SpatialFeature] {
        &self.features
    }

    pub fn feature(&self, device_id: &DeviceId) -> Option<&SpatialFeature> {
        self.features
            .binary_search_by(|f| f.device_id.cmp(device_id))
            .ok()
            .map(|i| &self.features[i])
    }

    /// Replaces the index contents.
    pub fn load(&mut self, features: impl IntoIterator<Item = SpatialFeature>) {
        let mut by_id: BTreeMap<DeviceId, SpatialFeature> = BTreeMap::new();
        for f in features {
            if f.device_id.is_empty() || !f.position.is_valid() {
                continue;
            }
            by_id.insert(f.device_id.clone(), f);
        }
        self.features = by_id.into_values().collect();

        let opts = self.options;
        let top = opts.max_zoom as usize + 1;
        self.levels = vec![Level::default(); top + 1];

        let nodes: Vec<Node> = self
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| Node {
                xy: project(f.position),
                kind: NodeKind::Point(i as u32),
                num_points: 1,
                parent: None,
            })
            .collect();
        self.levels[top] = Level::new(nodes, opts.node_size);

        for zoom in (opts.min_zoom..=opts.max_zoom).rev() {
            let above = zoom as usize + 1;
            let clustered = self.cluster_level(above, zoom);
            self.levels[zoom as usize] = Level::new(clustered, opts.node_size);
        }

        debug!(
            features = self.features.len(),
            levels = top + 1 - opts.min_zoom as usize,
            "cluster index rebuilt"
        );
    }

    /// Builds the nodes for `zoom` from the level above, recording parents on
    /// the level above.
    fn cluster_level(&mut self, above: usize, zoom: u8) -> Vec<Node> {
        let opts = self.options;
        let r = opts.radius_at(zoom);
        let n = self.features.len() as u64;
        let level = &mut self.levels[above];
        let mut claimed = vec![false; level.nodes.len()];
        let mut out = Vec::with_capacity(level.nodes.len());

        for i in 0..level.nodes.len() {
            if claimed[i] {
                continue;
            }
            claimed[i] = true;

            let origin = level.nodes[i].clone();
            let neighbors = level.tree.within(origin.xy, r);

            let mut num_points = origin.num_points;
            for &nb in &neighbors {
                if !claimed[nb as usize] {
                    num_points += level.nodes[nb as usize].num_points;
                }
            }

            if num_points > origin.num_points && num_points >= opts.min_points {
                let id = ((i as u64) << 5) + (zoom as u64 + 1) + n;
                let weight = origin.num_points as f64;
                let mut wx = origin.xy[0] * weight;
                let mut wy = origin.xy[1] * weight;
                for &nb in &neighbors {
                    let nb = nb as usize;
                    if claimed[nb] {
                        continue;
                    }
                    claimed[nb] = true;
                    let b = &mut level.nodes[nb];
                    let w = b.num_points as f64;
                    wx += b.xy[0] * w;
                    wy += b.xy[1] * w;
                    b.parent = Some(id);
                }
                level.nodes[i].parent = Some(id);
                out.push(Node {
                    xy: [wx / num_points as f64, wy / num_points as f64],
                    kind: NodeKind::Cluster(id),
                    num_points,
                    parent: None,
                });
            } else {
                out.push(Node {
                    parent: None,
                    ..origin
                });
                if num_points > 1 {
                    for &nb in &neighbors {
                        let nb = nb as usize;
                        if claimed[nb] {
                            continue;
                        }
                        claimed[nb] = true;
                        out.push(Node {
                            parent: None,
                            ..level.nodes[nb].clone()
                        });
                    }
                }
            }
        }
        out
    }

    /// Clusters and plain points inside `bounds` at `zoom`.
    ///
    /// Below the singleton threshold every lone point is wrapped in a
    /// single-member cluster with id `single-<device id>`.
    pub fn query(&self, bounds: LngLatBounds, zoom: f64) -> Partition {
        let mut out = Partition::default();
        if self.features.is_empty() {
            return out;
        }

        let level_zoom = self.options.level_for(zoom);
        let Some(level) = self.levels.get(level_zoom as usize) else {
            return out;
        };

        let floored = if zoom.is_finite() { zoom.floor() } else { 0.0 };
        let wrap_singles = floored < self.options.singleton_threshold() as f64;

        let mut hits: Vec<u32> = Vec::new();
        for b in bounds.normalized().split_antimeridian() {
            let min = [lng_x(b.west), lat_y(b.north)];
            let max = [lng_x(b.east), lat_y(b.south)];
            hits.extend(level.tree.range(min, max));
        }
        hits.sort_unstable();
        hits.dedup();

        for idx in hits {
            let node = &level.nodes[idx as usize];
            match node.kind {
                NodeKind::Cluster(id) => out.clusters.push(ClusterFeature {
                    id: ClusterId::Index(id),
                    position: unproject(node.xy),
                    point_count: node.num_points,
                }),
                NodeKind::Point(fi) => {
                    let feature = &self.features[fi as usize];
                    if wrap_singles {
                        out.clusters.push(ClusterFeature {
                            id: ClusterId::Single(feature.device_id.clone()),
                            position: feature.position,
                            point_count: 1,
                        });
                    } else {
                        out.points.push(feature.clone());
                    }
                }
            }
        }
        out
    }

    fn origin_of(&self, id: u64) -> Option<(usize, usize)> {
        let n = self.features.len() as u64;
        let local = id.checked_sub(n)?;
        Some(((local >> 5) as usize, (local % 32) as usize))
    }

    fn member(&self, node: &Node) -> ClusterMember {
        match node.kind {
            NodeKind::Cluster(id) => ClusterMember::Cluster(ClusterFeature {
                id: ClusterId::Index(id),
                position: unproject(node.xy),
                point_count: node.num_points,
            }),
            NodeKind::Point(fi) => ClusterMember::Point(self.features[fi as usize].clone()),
        }
    }

    /// Direct children of a real cluster, one zoom level up.
    pub fn children(&self, id: &ClusterId) -> Result<Vec<ClusterMember>, ClusterError> {
        let raw = match id {
            ClusterId::Index(raw) => *raw,
            ClusterId::Single(_) => return Err(ClusterError::Synthetic(id.clone())),
        };
        let not_found = || ClusterError::NotFound(id.clone());

        let (origin_id, origin_zoom) = self.origin_of(raw).ok_or_else(not_found)?;
        if origin_zoom == 0 {
            return Err(not_found());
        }
        let level = self.levels.get(origin_zoom).ok_or_else(not_found)?;
        let origin = level.nodes.get(origin_id).ok_or_else(not_found)?;

        let r = self.options.radius_at((origin_zoom - 1) as u8);
        let children: Vec<ClusterMember> = level
            .tree
            .within(origin.xy, r)
            .into_iter()
            .map(|i| &level.nodes[i as usize])
            .filter(|n| n.parent == Some(raw))
            .map(|n| self.member(n))
            .collect();

        if children.is_empty() {
            return Err(not_found());
        }
        Ok(children)
    }

    /// Member points of a cluster, skipping `offset` and returning at most
    /// `limit`.
    pub fn get_leaves(
        &self,
        id: &ClusterId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SpatialFeature>, ClusterError> {
        if let ClusterId::Single(device_id) = id {
            let feature = self
                .feature(device_id)
                .ok_or_else(|| ClusterError::NotFound(id.clone()))?;
            if offset > 0 || limit == 0 {
                return Ok(Vec::new());
            }
            return Ok(vec![feature.clone()]);
        }

        let mut leaves = Vec::new();
        if limit > 0 {
            self.append_leaves(&mut leaves, id, limit, offset, 0)?;
        }
        Ok(leaves)
    }

    fn append_leaves(
        &self,
        out: &mut Vec<SpatialFeature>,
        id: &ClusterId,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize, ClusterError> {
        for child in self.children(id)? {
            match child {
                ClusterMember::Cluster(c) => {
                    if skipped + c.point_count <= offset {
                        skipped += c.point_count;
                    } else {
                        skipped = self.append_leaves(out, &c.id, limit, offset, skipped)?;
                    }
                }
                ClusterMember::Point(p) => {
                    if skipped < offset {
                        skipped += 1;
                    } else {
                        out.push(p);
                    }
                }
            }
            if out.len() == limit {
                break;
            }
        }
        Ok(skipped)
    }

    /// Lowest zoom at which the cluster splits into more than one child or
    /// resolves into a plain point.
    ///
    /// Synthetic single-member clusters have no expansion zoom.
    pub fn expansion_zoom(&self, id: &ClusterId) -> Result<u8, ClusterError> {
        let ClusterId::Index(raw) = id else {
            return Err(ClusterError::Synthetic(id.clone()));
        };
        let (_, origin_zoom) = self
            .origin_of(*raw)
            .ok_or_else(|| ClusterError::NotFound(id.clone()))?;

        let mut current = id.clone();
        let mut zoom = origin_zoom.saturating_sub(1);
        while zoom <= self.options.max_zoom as usize {
            let children = self.children(&current)?;
            zoom += 1;
            if children.len() != 1 {
                break;
            }
            match children.into_iter().next() {
                Some(ClusterMember::Cluster(c)) => current = c.id,
                _ => break,
            }
        }
        Ok(zoom as u8)
    }

    /// Expansion zoom, or `min(floor(current_zoom) + 2, 16)` when the id has
    /// none.
    pub fn expansion_zoom_or_fallback(&self, id: &ClusterId, current_zoom: f64) -> u8 {
        match self.expansion_zoom(id) {
            Ok(zoom) => zoom,
            Err(err) => {
                debug!(%id, %err, "expansion zoom unavailable, using fallback");
                fallback_expansion_zoom(current_zoom)
            }
        }
    }
}
