use foundation::LngLat;
use layers::{CameraTarget, ModelType};

/// Zoom used when focusing a single device.
pub const FOCUS_ZOOM: f64 = 16.0;
pub const FOCUS_DURATION_MS: u64 = 1500;
pub const PITCH_2D: f64 = 0.0;
pub const PITCH_3D: f64 = 60.0;

pub fn pitch_for(model_type: ModelType) -> f64 {
    match model_type {
        ModelType::TwoD => PITCH_2D,
        ModelType::ThreeD => PITCH_3D,
    }
}

/// Camera move onto one device. Not caller-configurable.
pub fn focus_camera(center: LngLat, model_type: ModelType) -> CameraTarget {
    CameraTarget {
        center,
        zoom: FOCUS_ZOOM,
        pitch: pitch_for(model_type),
        duration_ms: FOCUS_DURATION_MS,
    }
}

/// Camera move into a clicked cluster.
pub fn cluster_camera(center: LngLat, zoom: u8, model_type: ModelType) -> CameraTarget {
    CameraTarget {
        center,
        zoom: zoom as f64,
        pitch: pitch_for(model_type),
        duration_ms: FOCUS_DURATION_MS,
    }
}

#[cfg(test)]
mod tests {
    use foundation::LngLat;
    use layers::ModelType;

    use super::{FOCUS_ZOOM, cluster_camera, focus_camera};

    #[test]
    fn pitch_follows_model_type() {
        let c = LngLat::new(4.0, 50.0);
        assert_eq!(focus_camera(c, ModelType::TwoD).pitch, 0.0);
        assert_eq!(focus_camera(c, ModelType::ThreeD).pitch, 60.0);
        assert_eq!(focus_camera(c, ModelType::ThreeD).zoom, FOCUS_ZOOM);
        assert_eq!(cluster_camera(c, 7, ModelType::TwoD).zoom, 7.0);
    }
}
