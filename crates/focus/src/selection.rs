use foundation::DeviceId;
use layers::{CameraTarget, MapHost, ModelType};
use telemetry::DeviceStore;
use tracing::debug;

use crate::camera::focus_camera;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub previous: Option<DeviceId>,
    pub current: Option<DeviceId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FocusOutcome {
    /// The device has no resolvable position; nothing happened.
    NoPosition,
    Focused {
        camera: CameraTarget,
        change: Option<SelectionChange>,
    },
}

/// The single selected device plus the one before it.
///
/// Every mutator returns `Some(change)` only when the current selection
/// actually changed, so callers can skip redundant work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    current: Option<DeviceId>,
    previous: Option<DeviceId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&DeviceId> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&DeviceId> {
        self.previous.as_ref()
    }

    pub fn select(&mut self, id: Option<DeviceId>) -> Option<SelectionChange> {
        let id = id.filter(|id| !id.is_empty());
        if self.current == id {
            return None;
        }
        self.previous = std::mem::replace(&mut self.current, id);
        Some(SelectionChange {
            previous: self.previous.clone(),
            current: self.current.clone(),
        })
    }

    pub fn clear(&mut self) -> Option<SelectionChange> {
        self.select(None)
    }

    /// A zoomed-out clustered view can't focus one device.
    pub fn on_zoom_end(&mut self, clusters_visible: bool) -> Option<SelectionChange> {
        if !clusters_visible {
            return None;
        }
        self.clear()
    }

    pub fn on_model_type_changed(&mut self) -> Option<SelectionChange> {
        self.clear()
    }

    /// Drops a selection whose device is no longer in `store`.
    pub fn retain_live(&mut self, store: &DeviceStore) -> Option<SelectionChange> {
        let dangling = self
            .current
            .as_ref()
            .is_some_and(|id| !store.contains(id.as_str()));
        if !dangling {
            return None;
        }
        debug!(device = ?self.current, "selected device disappeared, clearing selection");
        self.clear()
    }

    /// Selects `id` and flies the camera to it.
    ///
    /// A device without a valid position makes this a no-op: no selection
    /// change and no camera move.
    pub fn focus<H: MapHost + ?Sized>(
        &mut self,
        host: &mut H,
        store: &DeviceStore,
        id: &DeviceId,
        model_type: ModelType,
    ) -> FocusOutcome {
        let Some(position) = store.get(id.as_str()).and_then(|d| d.valid_position()) else {
            debug!(device = %id, "focus target has no position");
            return FocusOutcome::NoPosition;
        };
        let change = self.select(Some(id.clone()));
        let camera = focus_camera(position, model_type);
        host.fly_to(camera);
        FocusOutcome::Focused { camera, change }
    }
}
