use std::collections::{BTreeMap, BTreeSet};

use foundation::{HandleAllocator, LngLat, LngLatBounds};
use runtime::{ListenerId, ListenerRegistry};
use serde_json::Value;

use crate::host::{
    CameraTarget, HostError, HostEventKind, MapHost, MarkerClass, MarkerHandle, MarkerSpec,
    ModelHandle, ModelSpec,
};
use crate::sources::LayerSpec;

#[derive(Debug, Clone, PartialEq)]
pub struct MountedMarker {
    pub spec: MarkerSpec,
    pub classes: BTreeSet<MarkerClass>,
}

/// Headless host that records every call.
///
/// Used by the tracker binary and by tests. The viewport is set directly
/// with `set_viewport`; `fly_to` moves it to the target immediately. Both
/// queue the events a real map would fire, which `take_events` hands out
/// for subscribed kinds only.
#[derive(Debug)]
pub struct RecordingHost {
    style_loaded: bool,
    bounds: LngLatBounds,
    zoom: f64,
    sources: BTreeMap<String, Value>,
    source_writes: u64,
    layers: Vec<LayerSpec>,
    controls: Vec<String>,
    flights: Vec<CameraTarget>,
    listeners: ListenerRegistry<HostEventKind>,
    pending: Vec<HostEventKind>,
    marker_handles: HandleAllocator,
    markers: BTreeMap<MarkerHandle, MountedMarker>,
    markers_mounted: u64,
    model_handles: HandleAllocator,
    models: BTreeMap<ModelHandle, ModelSpec>,
    models_mounted: u64,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            style_loaded: false,
            bounds: LngLatBounds::WORLD,
            zoom: 0.0,
            sources: BTreeMap::new(),
            source_writes: 0,
            layers: Vec::new(),
            controls: Vec::new(),
            flights: Vec::new(),
            listeners: ListenerRegistry::new(),
            pending: Vec::new(),
            marker_handles: HandleAllocator::new(),
            markers: BTreeMap::new(),
            markers_mounted: 0,
            model_handles: HandleAllocator::new(),
            models: BTreeMap::new(),
            models_mounted: 0,
        }
    }

    pub fn set_style_loaded(&mut self, loaded: bool) {
        if loaded && !self.style_loaded {
            self.queue(HostEventKind::StyleLoad);
        }
        self.style_loaded = loaded;
    }

    pub fn set_viewport(&mut self, bounds: LngLatBounds, zoom: f64) {
        self.move_camera(bounds, zoom);
    }

    fn move_camera(&mut self, bounds: LngLatBounds, zoom: f64) {
        let zoomed = zoom != self.zoom;
        self.bounds = bounds;
        self.zoom = zoom;
        self.queue(HostEventKind::Move);
        self.queue(HostEventKind::MoveEnd);
        if zoomed {
            self.queue(HostEventKind::ZoomEnd);
        }
    }

    /// Events with no listener at fire time are lost, as on a real map.
    fn queue(&mut self, kind: HostEventKind) {
        if self.is_subscribed(kind) {
            self.pending.push(kind);
        }
    }

    /// Queued events whose kind has at least one subscriber, oldest first.
    pub fn take_events(&mut self) -> Vec<HostEventKind> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter(|kind| self.is_subscribed(*kind))
            .collect()
    }

    pub fn source(&self, id: &str) -> Option<&Value> {
        self.sources.get(id)
    }

    /// Number of `set_source_data` calls that landed.
    pub fn source_writes(&self) -> u64 {
        self.source_writes
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }

    pub fn controls(&self) -> &[String] {
        &self.controls
    }

    pub fn flights(&self) -> &[CameraTarget] {
        &self.flights
    }

    pub fn is_subscribed(&self, kind: HostEventKind) -> bool {
        self.listeners.iter().any(|(_, k)| *k == kind)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn markers(&self) -> impl Iterator<Item = (MarkerHandle, &MountedMarker)> + '_ {
        self.markers.iter().map(|(h, m)| (*h, m))
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&MountedMarker> {
        self.markers.get(&handle)
    }

    pub fn models(&self) -> impl Iterator<Item = (ModelHandle, &ModelSpec)> + '_ {
        self.models.iter().map(|(h, m)| (*h, m))
    }

    pub fn model(&self, handle: ModelHandle) -> Option<&ModelSpec> {
        self.models.get(&handle)
    }

    /// Total markers ever mounted.
    pub fn markers_mounted(&self) -> u64 {
        self.markers_mounted
    }

    /// Total models ever mounted.
    pub fn models_mounted(&self) -> u64 {
        self.models_mounted
    }

    fn marker_mut(&mut self, handle: MarkerHandle) -> Result<&mut MountedMarker, HostError> {
        self.markers
            .get_mut(&handle)
            .ok_or(HostError::StaleHandle(handle.0))
    }
}

impl MapHost for RecordingHost {
    fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, data: Value) -> Result<(), HostError> {
        if self.sources.contains_key(id) {
            return Err(HostError::DuplicateSource(id.to_owned()));
        }
        self.sources.insert(id.to_owned(), data);
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: Value) -> Result<(), HostError> {
        let Some(slot) = self.sources.get_mut(id) else {
            return Err(HostError::MissingSource(id.to_owned()));
        };
        *slot = data;
        self.source_writes += 1;
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), HostError> {
        if self.has_layer(&layer.id) {
            return Err(HostError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(HostError::LayerWithoutSource {
                layer: layer.id,
                source_id: layer.source,
            });
        }
        self.layers.push(layer);
        Ok(())
    }

    fn add_control(&mut self, name: &str) {
        self.controls.push(name.to_owned());
    }

    fn fly_to(&mut self, camera: CameraTarget) {
        self.move_camera(bounds_around(camera.center, camera.zoom), camera.zoom);
        self.flights.push(camera);
    }

    fn bounds(&self) -> LngLatBounds {
        self.bounds
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn subscribe(&mut self, kind: HostEventKind) -> ListenerId {
        self.listeners.subscribe(kind)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id).is_some()
    }

    fn mount_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerHandle, HostError> {
        let handle = MarkerHandle(self.marker_handles.alloc());
        self.markers.insert(
            handle,
            MountedMarker {
                spec: spec.clone(),
                classes: BTreeSet::new(),
            },
        );
        self.markers_mounted += 1;
        Ok(handle)
    }

    fn update_marker(&mut self, handle: MarkerHandle, spec: &MarkerSpec) -> Result<(), HostError> {
        self.marker_mut(handle)?.spec = spec.clone();
        Ok(())
    }

    fn add_marker_class(&mut self, handle: MarkerHandle, class: MarkerClass) -> Result<(), HostError> {
        self.marker_mut(handle)?.classes.insert(class);
        Ok(())
    }

    fn remove_marker_class(
        &mut self,
        handle: MarkerHandle,
        class: MarkerClass,
    ) -> Result<(), HostError> {
        self.marker_mut(handle)?.classes.remove(&class);
        Ok(())
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), HostError> {
        if self.markers.remove(&handle).is_none() {
            return Err(HostError::StaleHandle(handle.0));
        }
        self.marker_handles.free(handle.0);
        Ok(())
    }

    fn mount_model(&mut self, spec: &ModelSpec) -> Result<ModelHandle, HostError> {
        let handle = ModelHandle(self.model_handles.alloc());
        self.models.insert(handle, spec.clone());
        self.models_mounted += 1;
        Ok(handle)
    }

    fn update_model(&mut self, handle: ModelHandle, spec: &ModelSpec) -> Result<(), HostError> {
        let Some(slot) = self.models.get_mut(&handle) else {
            return Err(HostError::StaleHandle(handle.0));
        };
        *slot = spec.clone();
        Ok(())
    }

    fn remove_model(&mut self, handle: ModelHandle) -> Result<(), HostError> {
        if self.models.remove(&handle).is_none() {
            return Err(HostError::StaleHandle(handle.0));
        }
        self.model_handles.free(handle.0);
        Ok(())
    }
}

/// Approximate viewport for a camera centred on `center` at `zoom`, assuming
/// a 1024x768 pixel canvas with 512 px tiles.
fn bounds_around(center: LngLat, zoom: f64) -> LngLatBounds {
    let scale = 2f64.powf(zoom.max(0.0));
    let half_w = 360.0 * (1024.0 / 512.0) / scale / 2.0;
    let half_h = (half_w * 768.0 / 1024.0).min(90.0);
    if half_w >= 180.0 {
        return LngLatBounds::new(
            -180.0,
            (center.lat - half_h).max(-90.0),
            180.0,
            (center.lat + half_h).min(90.0),
        );
    }
    LngLatBounds::new(
        center.lng - half_w,
        (center.lat - half_h).max(-90.0),
        center.lng + half_w,
        (center.lat + half_h).min(90.0),
    )
    .normalized()
}

#[cfg(test)]
mod tests {
    use foundation::LngLat;
    use serde_json::json;

    use super::RecordingHost;
    use crate::host::{CameraTarget, HostError, HostEventKind, MapHost, MarkerClass, MarkerSpec};

    fn spec() -> MarkerSpec {
        MarkerSpec {
            device_id: "d1".into(),
            position: LngLat::new(1.0, 2.0),
            kind: "truck".into(),
            active: true,
            heading: None,
        }
    }

    #[test]
    fn set_source_data_requires_source() {
        let mut host = RecordingHost::new();
        assert_eq!(
            host.set_source_data("clusters", json!({})),
            Err(HostError::MissingSource("clusters".into()))
        );
        host.add_source("clusters", json!({})).unwrap();
        host.set_source_data("clusters", json!({"a": 1})).unwrap();
        assert_eq!(host.source("clusters"), Some(&json!({"a": 1})));
        assert_eq!(host.source_writes(), 1);
    }

    #[test]
    fn removed_marker_handles_go_stale() {
        let mut host = RecordingHost::new();
        let h = host.mount_marker(&spec()).unwrap();
        host.add_marker_class(h, MarkerClass::FadeIn).unwrap();
        assert!(host.marker(h).unwrap().classes.contains(&MarkerClass::FadeIn));
        host.remove_marker(h).unwrap();
        assert!(host.remove_marker(h).is_err());

        let h2 = host.mount_marker(&spec()).unwrap();
        assert_ne!(h, h2);
        assert!(host.update_marker(h, &spec()).is_err());
    }

    #[test]
    fn listeners_are_removed_by_id() {
        let mut host = RecordingHost::new();
        let a = host.subscribe(HostEventKind::Move);
        let b = host.subscribe(HostEventKind::ZoomEnd);
        assert!(host.unsubscribe(a));
        assert!(!host.unsubscribe(a));
        assert!(!host.is_subscribed(HostEventKind::Move));
        assert!(host.is_subscribed(HostEventKind::ZoomEnd));
        assert!(host.unsubscribe(b));
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn events_reach_subscribed_kinds_only() {
        let mut host = RecordingHost::new();
        host.subscribe(HostEventKind::MoveEnd);
        host.subscribe(HostEventKind::ZoomEnd);
        host.set_viewport(foundation::LngLatBounds::WORLD, 3.0);
        host.set_viewport(foundation::LngLatBounds::WORLD, 3.0);
        assert_eq!(
            host.take_events(),
            vec![HostEventKind::MoveEnd, HostEventKind::ZoomEnd, HostEventKind::MoveEnd]
        );
        assert!(host.take_events().is_empty());
    }

    #[test]
    fn fly_to_moves_viewport() {
        let mut host = RecordingHost::new();
        host.fly_to(CameraTarget {
            center: LngLat::new(10.0, 45.0),
            zoom: 16.0,
            pitch: 0.0,
            duration_ms: 1500,
        });
        assert_eq!(host.zoom(), 16.0);
        assert!(host.bounds().contains(LngLat::new(10.0, 45.0)));
        assert_eq!(host.flights().len(), 1);
    }
}
