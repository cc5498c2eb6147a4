use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Euler rotation in degrees applied to a 3D model instance.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Orientation {
    pub fn about(axis: Axis, degrees: f64) -> Self {
        let d = normalize_degrees(degrees);
        match axis {
            Axis::X => Orientation { x: d, ..Default::default() },
            Axis::Y => Orientation { y: d, ..Default::default() },
            Axis::Z => Orientation { z: d, ..Default::default() },
        }
    }
}

pub fn normalize_degrees(d: f64) -> f64 {
    if !d.is_finite() {
        return 0.0;
    }
    d.rem_euclid(360.0)
}

/// Device kind to the Euler axis its heading rotates about.
///
/// Models authored Y-up (vessels, buoys) turn about Y; everything else about
/// Z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisTable {
    #[serde(default)]
    by_kind: BTreeMap<String, Axis>,
    #[serde(default = "default_axis")]
    fallback: Axis,
}

fn default_axis() -> Axis {
    Axis::Z
}

impl Default for AxisTable {
    fn default() -> Self {
        let mut by_kind = BTreeMap::new();
        for kind in ["vessel", "boat", "buoy"] {
            by_kind.insert(kind.to_owned(), Axis::Y);
        }
        for kind in ["truck", "car", "drone", "tractor"] {
            by_kind.insert(kind.to_owned(), Axis::Z);
        }
        Self {
            by_kind,
            fallback: default_axis(),
        }
    }
}

impl AxisTable {
    pub fn with(mut self, kind: impl Into<String>, axis: Axis) -> Self {
        self.by_kind.insert(kind.into(), axis);
        self
    }

    pub fn axis_for(&self, kind: &str) -> Axis {
        self.by_kind
            .get(&kind.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Orientation for a device of `kind` with `heading`, plus any extra
    /// animated spin.
    pub fn orientation(&self, kind: &str, heading: Option<f64>, spin_deg: f64) -> Orientation {
        Orientation::about(self.axis_for(kind), heading.unwrap_or(0.0) + spin_deg)
    }
}

#[cfg(test)]
mod tests {
    use super::{Axis, AxisTable, Orientation, normalize_degrees};

    #[test]
    fn heading_maps_to_kind_axis() {
        let table = AxisTable::default();
        assert_eq!(
            table.orientation("Vessel", Some(90.0), 0.0),
            Orientation { x: 0.0, y: 90.0, z: 0.0 }
        );
        assert_eq!(
            table.orientation("truck", Some(-90.0), 0.0),
            Orientation { x: 0.0, y: 0.0, z: 270.0 }
        );
        assert_eq!(table.axis_for("unknown"), Axis::Z);
    }

    #[test]
    fn custom_axis_and_spin() {
        let table = AxisTable::default().with("crane", Axis::X);
        let o = table.orientation("crane", None, 400.0);
        assert_eq!(o, Orientation { x: 40.0, y: 0.0, z: 0.0 });
    }

    #[test]
    fn non_finite_degrees_are_zero() {
        assert_eq!(normalize_degrees(f64::NAN), 0.0);
        assert_eq!(normalize_degrees(-30.0), 330.0);
    }
}
