use serde::{Deserialize, Serialize};

use crate::position::LngLat;

/// Axis-aligned box in projected (unit Web-Mercator) space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    pub fn contains(&self, p: [f64; 2]) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }
}

/// Geographic bounding box in degrees, as reported by a map viewport.
///
/// `west > east` means the box crosses the antimeridian.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBounds {
    pub const WORLD: LngLatBounds = LngLatBounds {
        west: -180.0,
        south: -90.0,
        east: 180.0,
        north: 90.0,
    };

    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Smallest box holding all `points`; `None` for an empty slice.
    pub fn enclosing(points: &[LngLat]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Self::new(first.lng, first.lat, first.lng, first.lat);
        for p in &points[1..] {
            b.west = b.west.min(p.lng);
            b.east = b.east.max(p.lng);
            b.south = b.south.min(p.lat);
            b.north = b.north.max(p.lat);
        }
        Some(b)
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Normalizes the viewport box for querying.
    ///
    /// Longitudes are wrapped into [-180, 180]; a box spanning 360 degrees or
    /// more collapses to the full longitude range.
    pub fn normalized(&self) -> Self {
        let south = self.south.clamp(-90.0, 90.0);
        let north = self.north.clamp(-90.0, 90.0);
        if self.east - self.west >= 360.0 {
            return Self::new(-180.0, south, 180.0, north);
        }
        let west = wrap_lng(self.west);
        let east = wrap_lng(self.east);
        Self::new(west, south, east, north)
    }

    /// Splits an antimeridian-crossing box into its eastern and western halves.
    pub fn split_antimeridian(&self) -> Vec<Self> {
        if !self.crosses_antimeridian() {
            return vec![*self];
        }
        vec![
            Self::new(self.west, self.south, 180.0, self.north),
            Self::new(-180.0, self.south, self.east, self.north),
        ]
    }

    pub fn contains(&self, p: LngLat) -> bool {
        let lat_ok = p.lat >= self.south && p.lat <= self.north;
        let lng_ok = if self.crosses_antimeridian() {
            p.lng >= self.west || p.lng <= self.east
        } else {
            p.lng >= self.west && p.lng <= self.east
        };
        lat_ok && lng_ok
    }
}

fn wrap_lng(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    ((lng + 180.0).rem_euclid(360.0)) - 180.0
}
