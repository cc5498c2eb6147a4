use serde::{Deserialize, Serialize};

/// WGS84 longitude/latitude in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Both components finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Parses a `[lng, lat]` pair. Anything that isn't exactly two valid
    /// coordinates yields `None`.
    pub fn from_slice(coords: &[f64]) -> Option<Self> {
        let [lng, lat] = coords else {
            return None;
        };
        let p = Self::new(*lng, *lat);
        p.is_valid().then_some(p)
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

#[cfg(test)]
mod tests {
    use super::LngLat;

    #[test]
    fn from_slice_requires_two_valid_coords() {
        assert_eq!(
            LngLat::from_slice(&[13.4, 52.5]),
            Some(LngLat::new(13.4, 52.5))
        );
        assert_eq!(LngLat::from_slice(&[13.4]), None);
        assert_eq!(LngLat::from_slice(&[13.4, 52.5, 3.0]), None);
        assert_eq!(LngLat::from_slice(&[200.0, 0.0]), None);
        assert_eq!(LngLat::from_slice(&[f64::NAN, 0.0]), None);
    }
}
