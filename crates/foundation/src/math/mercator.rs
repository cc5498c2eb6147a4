//! Unit Web-Mercator projection.
//!
//! Longitude/latitude are mapped into `[0, 1] x [0, 1]` with `y` growing
//! southwards, the convention used by slippy-map tiles. Clustering radii are
//! expressed in this space scaled by `extent * 2^zoom`.

use core::f64::consts::PI;

use crate::position::LngLat;

pub fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

pub fn lat_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

pub fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

pub fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}

pub fn project(p: LngLat) -> [f64; 2] {
    [lng_x(p.lng), lat_y(p.lat)]
}

pub fn unproject(xy: [f64; 2]) -> LngLat {
    LngLat::new(x_lng(xy[0]), y_lat(xy[1]))
}

#[cfg(test)]
mod tests {
    use super::{lat_y, lng_x, project, unproject};
    use crate::position::LngLat;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn origin_maps_to_centre() {
        assert_close(lng_x(0.0), 0.5, 1e-12);
        assert_close(lat_y(0.0), 0.5, 1e-12);
    }

    #[test]
    fn poles_are_clamped() {
        assert_eq!(lat_y(90.0), 0.0);
        assert_eq!(lat_y(-90.0), 1.0);
    }

    #[test]
    fn round_trip_mid_latitudes() {
        let p = LngLat::new(-73.98, 40.75);
        let rt = unproject(project(p));
        assert_close(rt.lng, p.lng, 1e-9);
        assert_close(rt.lat, p.lat, 1e-9);
    }
}
