use std::fmt;

use foundation::{DeviceId, LngLat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of the synthetic id given to single-member clusters.
pub const SINGLE_PREFIX: &str = "single-";

/// A point derived from one device with a valid position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFeature {
    pub device_id: DeviceId,
    pub position: LngLat,
    /// Display-only properties copied into the point source.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl SpatialFeature {
    pub fn new(device_id: impl Into<DeviceId>, position: LngLat) -> Self {
        Self {
            device_id: device_id.into(),
            position,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Identifier of a cluster returned by a query.
///
/// `Index` ids are real clusters and encode the tree level they were built
/// from. `Single` ids are synthesized for lone points and carry the device id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClusterId {
    Index(u64),
    Single(DeviceId),
}

impl ClusterId {
    pub fn single(device_id: impl Into<DeviceId>) -> Self {
        ClusterId::Single(device_id.into())
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, ClusterId::Single(_))
    }

    /// Parses the textual form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(rest) = s.strip_prefix(SINGLE_PREFIX) {
            if rest.is_empty() {
                return None;
            }
            return Some(ClusterId::Single(DeviceId::new(rest)));
        }
        s.parse::<u64>().ok().map(ClusterId::Index)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterId::Index(id) => write!(f, "{id}"),
            ClusterId::Single(device) => write!(f, "{SINGLE_PREFIX}{device}"),
        }
    }
}

/// Aggregate pseudo-feature for one or more nearby devices.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFeature {
    pub id: ClusterId,
    pub position: LngLat,
    pub point_count: usize,
}

impl ClusterFeature {
    /// Short label for cluster icons: `999`, `1.2k`, `12k`.
    pub fn abbreviated(&self) -> String {
        abbreviate_count(self.point_count)
    }
}

pub fn abbreviate_count(count: usize) -> String {
    if count >= 10_000 {
        format!("{}k", (count as f64 / 1000.0).round() as u64)
    } else if count >= 1000 {
        let tenths = (count as f64 / 100.0).round() / 10.0;
        format!("{tenths}k")
    } else {
        count.to_string()
    }
}

/// Direct child of a cluster one level down.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterMember {
    Cluster(ClusterFeature),
    Point(SpatialFeature),
}

/// Output of one viewport query.
///
/// Ordering contract:
/// - Entries follow the index's internal order, which depends only on the
///   loaded feature set and never on input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partition {
    pub clusters: Vec<ClusterFeature>,
    pub points: Vec<SpatialFeature>,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.points.is_empty()
    }

    /// Number of devices accounted for by this partition.
    pub fn member_count(&self) -> usize {
        self.clusters.iter().map(|c| c.point_count).sum::<usize>() + self.points.len()
    }

    /// Device ids shown as plain points.
    pub fn point_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.points.iter().map(|p| &p.device_id)
    }

    /// True when `device_id` is shown as a plain point.
    pub fn is_point(&self, device_id: &DeviceId) -> bool {
        self.points.iter().any(|p| &p.device_id == device_id)
    }
}
