use serde::{Deserialize, Serialize};

/// Highest zoom a cluster click may fly to when the real expansion zoom is
/// unavailable.
pub const MAX_EXPANSION_ZOOM: u8 = 16;

/// Zoom steps added to the current zoom for the expansion fallback.
pub const EXPANSION_FALLBACK_STEP: u8 = 2;

/// Hard upper bound for `max_zoom`; cluster ids reserve five bits for zoom.
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// Lowest zoom with its own cluster level.
    pub min_zoom: u8,
    /// Highest zoom that clusters; above it every point is returned as-is.
    pub max_zoom: u8,
    /// Cluster radius in pixels.
    pub radius: f64,
    /// Tile extent the radius is relative to.
    pub extent: f64,
    /// Leaf size of the k-d trees.
    pub node_size: usize,
    /// Minimum neighbours (including self) needed to form a cluster.
    pub min_points: usize,
    /// Lone points are wrapped as single-member clusters below
    /// `singleton_max_zoom + 1`. `None` uses `max_zoom`.
    pub singleton_max_zoom: Option<u8>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 14,
            radius: 60.0,
            extent: 512.0,
            node_size: 64,
            min_points: 2,
            singleton_max_zoom: None,
        }
    }
}

impl ClusterOptions {
    /// Options with nonsensical values pulled back into range.
    pub fn sanitized(mut self) -> Self {
        self.max_zoom = self.max_zoom.min(MAX_SUPPORTED_ZOOM);
        self.min_zoom = self.min_zoom.min(self.max_zoom);
        if !self.radius.is_finite() || self.radius < 0.0 {
            self.radius = 0.0;
        }
        if !self.extent.is_finite() || self.extent <= 0.0 {
            self.extent = Self::default().extent;
        }
        self.node_size = self.node_size.max(1);
        self.min_points = self.min_points.max(2);
        self
    }

    /// Integer zoom at and above which lone points stay plain points.
    pub fn singleton_threshold(&self) -> u8 {
        self.singleton_max_zoom.unwrap_or(self.max_zoom).saturating_add(1)
    }

    /// Zoom level whose cluster tree answers a query at `zoom`.
    pub fn level_for(&self, zoom: f64) -> u8 {
        let z = if zoom.is_finite() { zoom.floor() } else { 0.0 };
        let z = z.clamp(self.min_zoom as f64, self.max_zoom as f64 + 1.0);
        z as u8
    }

    /// Search radius in unit Web-Mercator space at `zoom`.
    pub fn radius_at(&self, zoom: u8) -> f64 {
        self.radius / (self.extent * 2f64.powi(zoom as i32))
    }
}

/// Expansion zoom used when a cluster has no real expansion zoom.
pub fn fallback_expansion_zoom(current_zoom: f64) -> u8 {
    let z = if current_zoom.is_finite() {
        current_zoom.floor().max(0.0)
    } else {
        0.0
    };
    let z = z + EXPANSION_FALLBACK_STEP as f64;
    z.min(MAX_EXPANSION_ZOOM as f64) as u8
}

#[cfg(test)]
mod tests {
    use super::{ClusterOptions, fallback_expansion_zoom};

    #[test]
    fn level_for_floors_and_clamps() {
        let o = ClusterOptions::default();
        assert_eq!(o.level_for(3.9), 3);
        assert_eq!(o.level_for(-2.0), 0);
        assert_eq!(o.level_for(22.0), 15);
        assert_eq!(o.level_for(f64::NAN), 0);
    }

    #[test]
    fn singleton_threshold_defaults_to_max_zoom_plus_one() {
        let mut o = ClusterOptions::default();
        assert_eq!(o.singleton_threshold(), 15);
        o.singleton_max_zoom = Some(10);
        assert_eq!(o.singleton_threshold(), 11);
    }

    #[test]
    fn fallback_is_clamped() {
        assert_eq!(fallback_expansion_zoom(3.4), 5);
        assert_eq!(fallback_expansion_zoom(15.0), 16);
        assert_eq!(fallback_expansion_zoom(f64::INFINITY), 2);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let o: ClusterOptions = serde_json::from_str(r#"{"radius": 40}"#).unwrap();
        assert_eq!(o.radius, 40.0);
        assert_eq!(o.max_zoom, 14);
    }

    #[test]
    fn sanitized_fixes_ranges() {
        let o = ClusterOptions {
            min_zoom: 20,
            max_zoom: 40,
            radius: -1.0,
            extent: 0.0,
            node_size: 0,
            min_points: 0,
            singleton_max_zoom: None,
        }
        .sanitized();
        assert_eq!(o.max_zoom, 30);
        assert_eq!(o.min_zoom, 20);
        assert_eq!(o.radius, 0.0);
        assert_eq!(o.extent, 512.0);
        assert_eq!(o.node_size, 1);
        assert_eq!(o.min_points, 2);
    }
}
