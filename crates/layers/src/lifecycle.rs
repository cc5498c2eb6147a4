use std::collections::{BTreeMap, BTreeSet};

use cluster::Partition;
use foundation::{DeviceId, LngLat, Time};
use runtime::{AnimationClock, TimerId, TimerQueue};
use serde::{Deserialize, Serialize};
use telemetry::{Device, DeviceStatus};
use tracing::{debug, warn};

use crate::host::{HostError, MapHost, MarkerClass, MarkerHandle, MarkerSpec, ModelHandle, ModelSpec};
use crate::orientation::AxisTable;

/// Default delay between the fade-out class and the actual marker removal.
pub const DEFAULT_FADE_OUT_MS: u64 = 300;

/// Default spin speed of the focused 3D model.
pub const DEFAULT_SPIN_DEG_PER_S: f64 = 30.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelType {
    #[default]
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepresentationKind {
    None,
    Marker2d,
    Model3d,
    Clustered,
}

/// What is mounted for one device.
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    Marker2d {
        handle: MarkerHandle,
        spec: MarkerSpec,
    },
    Model3d {
        handle: ModelHandle,
        spec: ModelSpec,
        heading: Option<f64>,
    },
    /// Drawn by the cluster or point layers; no per-device handle.
    Clustered,
}

impl Representation {
    pub fn kind(&self) -> RepresentationKind {
        match self {
            Representation::Marker2d { .. } => RepresentationKind::Marker2d,
            Representation::Model3d { .. } => RepresentationKind::Model3d,
            Representation::Clustered => RepresentationKind::Clustered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub fade_out_ms: u64,
    pub spin_deg_per_s: f64,
    pub axes: AxisTable,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            fade_out_ms: DEFAULT_FADE_OUT_MS,
            spin_deg_per_s: DEFAULT_SPIN_DEG_PER_S,
            axes: AxisTable::default(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub mounted: usize,
    pub revived: usize,
    pub updated: usize,
    pub released: usize,
}

#[derive(Debug)]
enum LifecycleTimer {
    RemoveMarker { device: DeviceId, handle: MarkerHandle },
}

#[derive(Debug, Clone, Copy)]
struct Fading {
    handle: MarkerHandle,
    timer: TimerId,
}

#[derive(Debug, Clone)]
struct Spin {
    device: DeviceId,
    clock: AnimationClock,
    angle_deg: f64,
}

/// Owns every per-device visual representation.
///
/// Key properties:
/// - After `sync_devices`, each synced device with a valid position has
///   exactly one representation; every other device has none.
/// - A marker leaving the map gets the fade-out class and is removed by a
///   timer. If the device gets a marker again first, the timer is cancelled
///   and the same marker is revived.
/// - Only the focused device's 3D model spins, and only while it is mounted.
#[derive(Debug)]
pub struct LifecycleManager {
    config: LifecycleConfig,
    model_type: ModelType,
    clusters_visible: bool,
    mounted: BTreeMap<DeviceId, Representation>,
    fading: BTreeMap<DeviceId, Fading>,
    timers: TimerQueue<LifecycleTimer>,
    focused: Option<DeviceId>,
    spin: Option<Spin>,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            model_type: ModelType::TwoD,
            clusters_visible: false,
            mounted: BTreeMap::new(),
            fading: BTreeMap::new(),
            timers: TimerQueue::new(),
            focused: None,
            spin: None,
        }
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn clusters_visible(&self) -> bool {
        self.clusters_visible
    }

    pub fn representation(&self, id: &DeviceId) -> RepresentationKind {
        self.mounted
            .get(id)
            .map_or(RepresentationKind::None, Representation::kind)
    }

    pub fn representations(&self) -> impl Iterator<Item = (&DeviceId, RepresentationKind)> + '_ {
        self.mounted.iter().map(|(id, r)| (id, r.kind()))
    }

    pub fn marker_handle(&self, id: &DeviceId) -> Option<MarkerHandle> {
        match self.mounted.get(id) {
            Some(Representation::Marker2d { handle, .. }) => Some(*handle),
            _ => None,
        }
    }

    pub fn model_handle(&self, id: &DeviceId) -> Option<ModelHandle> {
        match self.mounted.get(id) {
            Some(Representation::Model3d { handle, .. }) => Some(*handle),
            _ => None,
        }
    }

    /// Markers faded out but not yet removed.
    pub fn fading_count(&self) -> usize {
        self.fading.len()
    }

    pub fn next_timer_due(&self) -> Option<Time> {
        self.timers.next_due()
    }

    pub fn focused(&self) -> Option<&DeviceId> {
        self.focused.as_ref()
    }

    /// Device whose model is currently spinning.
    pub fn spinning(&self) -> Option<&DeviceId> {
        self.spin.as_ref().map(|s| &s.device)
    }

    fn desired(&self, is_point: bool) -> RepresentationKind {
        if self.clusters_visible || !is_point {
            return RepresentationKind::Clustered;
        }
        match self.model_type {
            ModelType::TwoD => RepresentationKind::Marker2d,
            ModelType::ThreeD => RepresentationKind::Model3d,
        }
    }

    /// Reconciles the full device set against what is mounted.
    ///
    /// Devices without a valid position are skipped; anything mounted for a
    /// device not in `devices` is torn down.
    pub fn sync_devices<'a, H: MapHost + ?Sized>(
        &mut self,
        host: &mut H,
        devices: impl IntoIterator<Item = &'a Device>,
        partition: &Partition,
        now: Time,
    ) -> SyncReport {
        let points: BTreeSet<&DeviceId> = partition.point_ids().collect();
        let mut report = SyncReport::default();
        let mut seen: BTreeSet<DeviceId> = BTreeSet::new();

        for device in devices {
            let Some(position) = device.valid_position() else {
                continue;
            };
            seen.insert(device.id.clone());
            let desired = self.desired(points.contains(&device.id));
            self.apply(host, device, position, desired, now, &mut report);
        }

        let orphans: Vec<DeviceId> = self
            .mounted
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in orphans {
            if let Some(rep) = self.mounted.remove(&id) {
                self.release(host, &id, rep, now);
                report.released += 1;
            }
        }

        self.ensure_spin();
        report
    }

    fn apply<H: MapHost + ?Sized>(
        &mut self,
        host: &mut H,
        device: &Device,
        position: LngLat,
        desired: RepresentationKind,
        now: Time,
        report: &mut SyncReport,
    ) {
        let current = self.representation(&device.id);
        if current == desired {
            if self.refresh(host, device, position) {
                report.updated += 1;
            }
            return;
        }

        if let Some(rep) = self.mounted.remove(&device.id) {
            self.release(host, &device.id, rep, now);
            report.released += 1;
        }

        let rep = match desired {
            RepresentationKind::None => return,
            RepresentationKind::Clustered => Some(Representation::Clustered),
            RepresentationKind::Marker2d => {
                let spec = marker_spec(device, position);
                if let Some(handle) = self.revive_marker(host, &device.id, &spec) {
                    report.revived += 1;
                    Some(Representation::Marker2d { handle, spec })
                } else {
                    self.mount_marker(host, spec).inspect(|_| report.mounted += 1)
                }
            }
            RepresentationKind::Model3d => {
                let spec = self.model_spec(device, position);
                match host.mount_model(&spec) {
                    Ok(handle) => {
                        report.mounted += 1;
                        Some(Representation::Model3d {
                            handle,
                            spec,
                            heading: device.heading,
                        })
                    }
                    Err(err) => {
                        warn!(device = %device.id, %err, "model mount failed");
                        None
                    }
                }
            }
        };
        if let Some(rep) = rep {
            self.mounted.insert(device.id.clone(), rep);
        }
    }

    /// Pushes fresh data into an already-mounted representation. Returns
    /// `true` if the host was called.
    fn refresh<H: MapHost + ?Sized>(&mut self, host: &mut H, device: &Device, position: LngLat) -> bool {
        let spin = self.spin_angle(&device.id);
        let axes = &self.config.axes;
        match self.mounted.get_mut(&device.id) {
            Some(Representation::Marker2d { handle, spec }) => {
                let next = marker_spec(device, position);
                if *spec == next {
                    return false;
                }
                if let Err(err) = host.update_marker(*handle, &next) {
                    warn!(device = %device.id, %err, "marker update failed");
                    return false;
                }
                *spec = next;
                true
            }
            Some(Representation::Model3d { handle, spec, heading }) => {
                let next = ModelSpec {
                    device_id: device.id.clone(),
                    position,
                    model: device.kind.clone(),
                    orientation: axes.orientation(&device.kind, device.heading, spin),
                };
                if *spec == next {
                    return false;
                }
                if let Err(err) = host.update_model(*handle, &next) {
                    warn!(device = %device.id, %err, "model update failed");
                    return false;
                }
                *spec = next;
                *heading = device.heading;
                true
            }
            _ => false,
        }
    }

    fn mount_marker<H: MapHost + ?Sized>(&mut self, host: &mut H, spec: MarkerSpec) -> Option<Representation> {
        let handle = match host.mount_marker(&spec) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(device = %spec.device_id, %err, "marker mount failed");
                return None;
            }
        };
        class_added(host.add_marker_class(handle, MarkerClass::FadeIn), &spec.device_id, MarkerClass::FadeIn);
        if self.focused.as_ref() == Some(&spec.device_id) {
            class_added(host.add_marker_class(handle, MarkerClass::Focused), &spec.device_id, MarkerClass::Focused);
        }
        Some(Representation::Marker2d { handle, spec })
    }

    /// Cancels a pending removal and brings the fading marker back.
    fn revive_marker<H: MapHost + ?Sized>(
        &mut self,
        host: &mut H,
        id: &DeviceId,
        spec: &MarkerSpec,
    ) -> Option<MarkerHandle> {
        let fading = self.fading.remove(id)?;
        self.timers.cancel(fading.timer);
        let handle = fading.handle;
        let revived = host
            .remove_marker_class(handle, MarkerClass::FadeOut)
            .and_then(|_| host.add_marker_class(handle, MarkerClass::FadeIn))
            .and_then(|_| host.update_marker(handle, spec));
        if let Err(err) = revived {
            debug!(device = %id, %err, "fading marker unusable, mounting a fresh one");
            removed(host.remove_marker(handle), id);
            return None;
        }
        if self.focused.as_ref() == Some(id) {
            class_added(host.add_marker_class(handle, MarkerClass::Focused), id, MarkerClass::Focused);
        }
        debug!(device = %id, "revived fading marker");
        Some(handle)
    }

    /// Tears down one representation. Markers fade; models go immediately.
    fn release<H: MapHost + ?Sized>(&mut self, host: &mut H, id: &DeviceId, rep: Representation, now: Time) {
        match rep {
            Representation::Marker2d { handle, .. } => self.fade_out(host, id, handle, now),
            Representation::Model3d { handle, .. } => {
                if self.spinning() == Some(id) {
                    self.spin = None;
                }
                if let Err(err) = host.remove_model(handle) {
                    warn!(device = %id, %err, "model removal failed");
                }
            }
            Representation::Clustered => {}
        }
    }

    fn fade_out<H: MapHost + ?Sized>(&mut self, host: &mut H, id: &DeviceId, handle: MarkerHandle, now: Time) {
        class_removed(host.remove_marker_class(handle, MarkerClass::Focused), id, MarkerClass::Focused);
        class_removed(host.remove_marker_class(handle, MarkerClass::FadeIn), id, MarkerClass::FadeIn);
        if let Err(err) = host.add_marker_class(handle, MarkerClass::FadeOut) {
            warn!(device = %id, %err, "marker already gone");
            return;
        }
        let due = now.after_millis(self.config.fade_out_ms);
        let timer = self.timers.schedule(
            due,
            LifecycleTimer::RemoveMarker {
                device: id.clone(),
                handle,
            },
        );
        if let Some(stale) = self.fading.insert(id.clone(), Fading { handle, timer }) {
            // Only one marker per device can be fading; finish the older one.
            self.timers.cancel(stale.timer);
            removed(host.remove_marker(stale.handle), id);
        }
    }

    /// Fires due marker removals and advances the spin animation.
    pub fn tick<H: MapHost + ?Sized>(&mut self, host: &mut H, now: Time) {
        while let Some((timer, LifecycleTimer::RemoveMarker { device, handle })) = self.timers.pop_due(now) {
            let owned = self
                .fading
                .get(&device)
                .is_some_and(|f| f.timer == timer && f.handle == handle);
            if !owned {
                continue;
            }
            self.fading.remove(&device);
            if let Err(err) = host.remove_marker(handle) {
                debug!(device = %device, %err, "faded marker already removed");
            }
        }

        let Some(spin) = self.spin.as_mut() else {
            return;
        };
        let frame = spin.clock.advance(now);
        spin.angle_deg = (spin.angle_deg + self.config.spin_deg_per_s * frame.dt_s).rem_euclid(360.0);
        let angle = spin.angle_deg;
        let device = spin.device.clone();

        let axes = &self.config.axes;
        if let Some(Representation::Model3d { handle, spec, heading }) = self.mounted.get_mut(&device) {
            let mut next = spec.clone();
            next.orientation = axes.orientation(&next.model, *heading, angle);
            match host.update_model(*handle, &next) {
                Ok(()) => *spec = next,
                Err(err) => warn!(device = %device, %err, "spin update failed"),
            }
        }
    }

    fn spin_angle(&self, id: &DeviceId) -> f64 {
        self.spin
            .as_ref()
            .filter(|s| &s.device == id)
            .map_or(0.0, |s| s.angle_deg)
    }

    fn ensure_spin(&mut self) {
        let Some(focused) = self.focused.as_ref() else {
            self.spin = None;
            return;
        };
        let has_model = matches!(self.mounted.get(focused), Some(Representation::Model3d { .. }));
        if !has_model || self.model_type != ModelType::ThreeD {
            self.spin = None;
            return;
        }
        if self.spinning() != Some(focused) {
            self.spin = Some(Spin {
                device: focused.clone(),
                clock: AnimationClock::default(),
                angle_deg: 0.0,
            });
        }
    }

    /// Moves marker focus state to `focus` and restarts the spin animation.
    pub fn set_focus<H: MapHost + ?Sized>(&mut self, host: &mut H, focus: Option<&DeviceId>) {
        if self.focused.as_ref() == focus {
            return;
        }
        if let Some(prev) = self.focused.take()
            && let Some(handle) = self.marker_handle(&prev)
        {
            class_removed(host.remove_marker_class(handle, MarkerClass::Focused), &prev, MarkerClass::Focused);
        }
        self.spin = None;
        self.focused = focus.cloned();
        if let Some(id) = focus
            && let Some(handle) = self.marker_handle(id)
        {
            class_added(host.add_marker_class(handle, MarkerClass::Focused), id, MarkerClass::Focused);
        }
        self.ensure_spin();
    }

    /// Switches 2D/3D and resyncs. Focus state and the spin animation are
    /// dropped.
    pub fn set_model_type<'a, H: MapHost + ?Sized>(
        &mut self,
        host: &mut H,
        model_type: ModelType,
        devices: impl IntoIterator<Item = &'a Device>,
        partition: &Partition,
        now: Time,
    ) -> Option<SyncReport> {
        if self.model_type == model_type {
            return None;
        }
        self.spin = None;
        self.set_focus(host, None);
        self.model_type = model_type;
        Some(self.sync_devices(host, devices, partition, now))
    }

    /// Shows or hides cluster iconography and resyncs.
    pub fn set_clusters_visible<'a, H: MapHost + ?Sized>(
        &mut self,
        host: &mut H,
        visible: bool,
        devices: impl IntoIterator<Item = &'a Device>,
        partition: &Partition,
        now: Time,
    ) -> Option<SyncReport> {
        if self.clusters_visible == visible {
            return None;
        }
        self.clusters_visible = visible;
        Some(self.sync_devices(host, devices, partition, now))
    }

    /// Removes everything immediately, including fading markers.
    pub fn shutdown<H: MapHost + ?Sized>(&mut self, host: &mut H) {
        self.spin = None;
        self.focused = None;
        self.timers.clear();
        for (id, fading) in std::mem::take(&mut self.fading) {
            removed(host.remove_marker(fading.handle), &id);
        }
        for (id, rep) in std::mem::take(&mut self.mounted) {
            let removed = match rep {
                Representation::Marker2d { handle, .. } => host.remove_marker(handle),
                Representation::Model3d { handle, .. } => host.remove_model(handle),
                Representation::Clustered => Ok(()),
            };
            if let Err(err) = removed {
                debug!(device = %id, %err, "representation already gone at shutdown");
            }
        }
    }

    fn model_spec(&self, device: &Device, position: LngLat) -> ModelSpec {
        ModelSpec {
            device_id: device.id.clone(),
            position,
            model: device.kind.clone(),
            orientation: self
                .config
                .axes
                .orientation(&device.kind, device.heading, self.spin_angle(&device.id)),
        }
    }
}

fn marker_spec(device: &Device, position: LngLat) -> MarkerSpec {
    MarkerSpec {
        device_id: device.id.clone(),
        position,
        kind: device.kind.clone(),
        active: device.status == DeviceStatus::Active,
        heading: device.heading,
    }
}

/// A class the host refused leaves the marker visually out of step.
fn class_added(result: Result<(), HostError>, device: &DeviceId, class: MarkerClass) {
    if let Err(err) = result {
        warn!(device = %device, ?class, %err, "marker class not applied");
    }
}

fn class_removed(result: Result<(), HostError>, device: &DeviceId, class: MarkerClass) {
    if let Err(err) = result {
        debug!(device = %device, ?class, %err, "marker class not removed");
    }
}

fn removed(result: Result<(), HostError>, device: &DeviceId) {
    if let Err(err) = result {
        debug!(device = %device, %err, "marker already gone");
    }
}

#[cfg(test)]
mod tests {
    use cluster::{ClusterIndex, Partition};
    use foundation::{DeviceId, LngLat, LngLatBounds, Time};
    use pretty_assertions::assert_eq;
    use telemetry::{Device, FeatureTag};

    use super::{LifecycleManager, ModelType, RepresentationKind};
    use crate::host::MarkerClass;
    use crate::reconcile::spatial_feature;
    use crate::recording::RecordingHost;

    fn device(id: &str, lng: f64, lat: f64) -> Device {
        Device::new(DeviceId::new(id), FeatureTag::location())
            .with_kind("truck")
            .with_position(LngLat::new(lng, lat))
    }

    /// Partition at zoom 16, where every device is a plain point.
    fn all_points(devices: &[Device]) -> Partition {
        let mut index = ClusterIndex::default();
        index.load(devices.iter().filter_map(spatial_feature));
        index.query(LngLatBounds::WORLD, 16.0)
    }

    fn assert_one_each(mgr: &LifecycleManager, devices: &[Device]) {
        for d in devices {
            let kind = mgr.representation(&d.id);
            if d.valid_position().is_some() {
                assert_ne!(kind, RepresentationKind::None, "{}", d.id);
            } else {
                assert_eq!(kind, RepresentationKind::None, "{}", d.id);
            }
        }
        assert_eq!(mgr.representations().count(), devices.iter().filter(|d| d.valid_position().is_some()).count());
    }

    #[test]
    fn plain_points_get_markers_in_2d() {
        let devices = vec![device("a", 1.0, 1.0), device("b", 50.0, 10.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();

        let report = mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        assert_eq!(report.mounted, 2);
        assert_eq!(host.markers().count(), 2);
        let h = mgr.marker_handle(&DeviceId::new("a")).unwrap();
        assert!(host.marker(h).unwrap().classes.contains(&MarkerClass::FadeIn));
        assert_one_each(&mgr, &devices);
    }

    #[test]
    fn devices_without_position_are_skipped() {
        let mut devices = vec![device("a", 1.0, 1.0), device("b", 2.0, 2.0)];
        devices[1].position = None;
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        assert_one_each(&mgr, &devices);
        assert_eq!(host.markers().count(), 1);
    }

    #[test]
    fn clustered_devices_have_no_marker() {
        let devices = vec![device("a", 1.0, 1.0)];
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &Partition::default(), Time(0.0));
        assert_eq!(mgr.representation(&DeviceId::new("a")), RepresentationKind::Clustered);
        assert_eq!(host.markers().count(), 0);
    }

    #[test]
    fn lone_device_below_singleton_threshold_stays_clustered() {
        let devices = vec![device("a", 1.0, 1.0)];
        let mut index = ClusterIndex::default();
        index.load(devices.iter().filter_map(spatial_feature));
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        assert!(!mgr.clusters_visible());

        let at_14 = index.query(LngLatBounds::WORLD, 14.0);
        assert_eq!(at_14.clusters[0].id.to_string(), "single-a");
        mgr.sync_devices(&mut host, &devices, &at_14, Time(0.0));
        assert_eq!(mgr.representation(&DeviceId::new("a")), RepresentationKind::Clustered);
        assert_eq!(host.markers().count(), 0);

        let at_15 = index.query(LngLatBounds::WORLD, 15.0);
        mgr.sync_devices(&mut host, &devices, &at_15, Time(1.0));
        assert_eq!(mgr.representation(&DeviceId::new("a")), RepresentationKind::Marker2d);
        assert_eq!(host.markers().count(), 1);
    }

    #[test]
    fn focus_on_a_marker_the_host_dropped_keeps_state() {
        use crate::host::MapHost;

        let devices = vec![device("a", 1.0, 1.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        let h = mgr.marker_handle(&DeviceId::new("a")).unwrap();
        host.remove_marker(h).unwrap();

        mgr.set_focus(&mut host, Some(&DeviceId::new("a")));
        assert_eq!(mgr.focused(), Some(&DeviceId::new("a")));
        mgr.set_focus(&mut host, None);
        assert_eq!(mgr.focused(), None);
        assert_eq!(host.markers().count(), 0);
    }

    #[test]
    fn removed_marker_fades_then_goes() {
        let devices = vec![device("a", 1.0, 1.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        let h = mgr.marker_handle(&DeviceId::new("a")).unwrap();

        let report = mgr.sync_devices(&mut host, &[], &Partition::default(), Time(1.0));
        assert_eq!(report.released, 1);
        assert_eq!(mgr.representation(&DeviceId::new("a")), RepresentationKind::None);
        let faded = host.marker(h).unwrap();
        assert!(faded.classes.contains(&MarkerClass::FadeOut));
        assert!(!faded.classes.contains(&MarkerClass::FadeIn));

        mgr.tick(&mut host, Time(1.2));
        assert!(host.marker(h).is_some());
        mgr.tick(&mut host, Time(1.5));
        assert!(host.marker(h).is_none());
        assert_eq!(mgr.fading_count(), 0);
    }

    #[test]
    fn reappearing_device_cancels_pending_removal() {
        let devices = vec![device("a", 1.0, 1.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        let h = mgr.marker_handle(&DeviceId::new("a")).unwrap();

        mgr.sync_devices(&mut host, &[], &Partition::default(), Time(1.0));
        let report = mgr.sync_devices(&mut host, &devices, &partition, Time(1.1));
        assert_eq!(report.revived, 1);
        assert_eq!(mgr.marker_handle(&DeviceId::new("a")), Some(h));

        mgr.tick(&mut host, Time(5.0));
        let marker = host.marker(h).unwrap();
        assert!(!marker.classes.contains(&MarkerClass::FadeOut));
        assert_eq!(host.markers().count(), 1);
        assert_eq!(host.markers_mounted(), 1);
    }

    #[test]
    fn mode_toggles_keep_exactly_one_representation() {
        let devices = vec![
            device("a", 1.0, 1.0),
            device("b", 1.0001, 1.0),
            device("c", -70.0, -30.0),
        ];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        let mut now = 0.0;
        mgr.sync_devices(&mut host, &devices, &partition, Time(now));

        for step in 0..6 {
            now += 0.1;
            if step % 2 == 0 {
                let next = if mgr.model_type() == ModelType::TwoD {
                    ModelType::ThreeD
                } else {
                    ModelType::TwoD
                };
                mgr.set_model_type(&mut host, next, &devices, &partition, Time(now));
            } else {
                let visible = !mgr.clusters_visible();
                mgr.set_clusters_visible(&mut host, visible, &devices, &partition, Time(now));
            }
            assert_one_each(&mgr, &devices);

            let live_models = host.models().count();
            let model_reps = mgr
                .representations()
                .filter(|(_, k)| *k == RepresentationKind::Model3d)
                .count();
            assert_eq!(live_models, model_reps, "step {step}");
        }

        mgr.tick(&mut host, Time(now + 1.0));
        let marker_reps = mgr
            .representations()
            .filter(|(_, k)| *k == RepresentationKind::Marker2d)
            .count();
        assert_eq!(host.markers().count(), marker_reps);
    }

    #[test]
    fn three_d_mounts_models_and_tears_markers_down() {
        let devices = vec![device("a", 1.0, 1.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        mgr.set_model_type(&mut host, ModelType::ThreeD, &devices, &partition, Time(0.0));

        assert_eq!(mgr.representation(&DeviceId::new("a")), RepresentationKind::Model3d);
        assert_eq!(host.models().count(), 1);
        assert_eq!(mgr.fading_count(), 1);
        mgr.tick(&mut host, Time(1.0));
        assert_eq!(host.markers().count(), 0);
    }

    #[test]
    fn only_focused_model_spins() {
        let mut devices = vec![device("a", 1.0, 1.0), device("b", 20.0, 20.0)];
        devices[0].heading = Some(90.0);
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.set_model_type(&mut host, ModelType::ThreeD, &devices, &partition, Time(0.0));

        let a = DeviceId::new("a");
        mgr.set_focus(&mut host, Some(&a));
        assert_eq!(mgr.spinning(), Some(&a));

        mgr.tick(&mut host, Time(0.0));
        mgr.tick(&mut host, Time(0.1));
        let handle = mgr.model_handle(&a).unwrap();
        let z = host.model(handle).unwrap().orientation.z;
        assert!((z - 93.0).abs() < 1e-9, "z = {z}");

        let b_handle = mgr.model_handle(&DeviceId::new("b")).unwrap();
        assert_eq!(host.model(b_handle).unwrap().orientation.z, 0.0);

        mgr.set_model_type(&mut host, ModelType::TwoD, &devices, &partition, Time(0.2));
        assert_eq!(mgr.spinning(), None);
        assert_eq!(mgr.focused(), None);
    }

    #[test]
    fn spin_stops_when_device_disappears() {
        let devices = vec![device("a", 1.0, 1.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.set_model_type(&mut host, ModelType::ThreeD, &devices, &partition, Time(0.0));
        mgr.set_focus(&mut host, Some(&DeviceId::new("a")));
        assert!(mgr.spinning().is_some());

        mgr.sync_devices(&mut host, &[], &Partition::default(), Time(1.0));
        assert_eq!(mgr.spinning(), None);
        assert_eq!(host.models().count(), 0);
    }

    #[test]
    fn focus_class_moves_between_markers() {
        let devices = vec![device("a", 1.0, 1.0), device("b", 30.0, 1.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        let a = DeviceId::new("a");
        let b = DeviceId::new("b");

        mgr.set_focus(&mut host, Some(&a));
        let ha = mgr.marker_handle(&a).unwrap();
        let hb = mgr.marker_handle(&b).unwrap();
        assert!(host.marker(ha).unwrap().classes.contains(&MarkerClass::Focused));

        mgr.set_focus(&mut host, Some(&b));
        assert!(!host.marker(ha).unwrap().classes.contains(&MarkerClass::Focused));
        assert!(host.marker(hb).unwrap().classes.contains(&MarkerClass::Focused));
        assert_eq!(mgr.spinning(), None);
    }

    #[test]
    fn shutdown_removes_everything() {
        let devices = vec![device("a", 1.0, 1.0), device("b", 30.0, 1.0)];
        let partition = all_points(&devices);
        let mut host = RecordingHost::new();
        let mut mgr = LifecycleManager::default();
        mgr.sync_devices(&mut host, &devices, &partition, Time(0.0));
        mgr.sync_devices(&mut host, &devices[..1], &partition, Time(0.5));
        assert_eq!(mgr.fading_count(), 1);

        mgr.shutdown(&mut host);
        assert_eq!(host.markers().count(), 0);
        assert_eq!(mgr.representations().count(), 0);
        assert_eq!(mgr.next_timer_due(), None);
    }
}
