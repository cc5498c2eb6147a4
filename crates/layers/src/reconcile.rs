use cluster::geojson::{clusters_collection, points_collection};
use cluster::{ClusterIndex, ClusterOptions, Partition, SpatialFeature};
use foundation::LngLatBounds;
use serde_json::json;
use telemetry::{Device, DeviceStatus, DeviceStore, FeatureTag};
use tracing::{debug, warn};

use crate::host::MapHost;
use crate::sources::{CLUSTERS_SOURCE, POINTS_SOURCE, sources_ready};

/// Why a reconciliation pass runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Pan/zoom/move; the index is current.
    Viewport,
    /// A store write. `membership_changed` marks the index stale.
    Mutation { membership_changed: bool },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// Sources are not mounted yet; nothing was written.
    HostNotReady,
    /// The host rejected a write; logged, retried on the next trigger.
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub rebuilt: bool,
    pub push: PushOutcome,
}

/// Point feature for one device; `None` without a valid position.
pub fn spatial_feature(device: &Device) -> Option<SpatialFeature> {
    let position = device.valid_position()?;
    let mut feature = SpatialFeature::new(device.id.clone(), position)
        .with_property("kind", device.kind.clone())
        .with_property("active", device.status == DeviceStatus::Active);
    if let Some(heading) = device.heading {
        feature = feature.with_property("heading", json!(heading));
    }
    for (k, v) in &device.properties {
        feature.properties.entry(k.clone()).or_insert_with(|| v.clone());
    }
    Some(feature)
}

/// Keeps the cluster index and the two backing sources in step with the
/// store and the viewport.
///
/// Every pass reads current state; repeated calls with unchanged inputs push
/// identical collections.
#[derive(Debug, Clone)]
pub struct Reconciler {
    feature: FeatureTag,
    index: ClusterIndex,
    partition: Partition,
    rebuilds: u64,
}

impl Reconciler {
    pub fn new(feature: FeatureTag, options: ClusterOptions) -> Self {
        Self {
            feature,
            index: ClusterIndex::new(options),
            partition: Partition::default(),
            rebuilds: 0,
        }
    }

    pub fn feature(&self) -> &FeatureTag {
        &self.feature
    }

    pub fn index(&self) -> &ClusterIndex {
        &self.index
    }

    /// Partition computed by the last pass.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Rebuilds the index from the store's current feature subset.
    pub fn rebuild(&mut self, store: &DeviceStore) {
        let features: Vec<SpatialFeature> =
            store.by_feature(&self.feature).filter_map(spatial_feature).collect();
        debug!(feature = %self.feature.as_str(), count = features.len(), "rebuilding cluster index");
        self.index.load(features);
        self.rebuilds += 1;
    }

    /// Queries the viewport and pushes both collections to the host.
    pub fn reconcile<H: MapHost + ?Sized>(
        &mut self,
        store: &DeviceStore,
        host: &mut H,
        trigger: Trigger,
    ) -> ReconcileReport {
        let rebuilt = matches!(trigger, Trigger::Mutation { membership_changed: true });
        if rebuilt {
            self.rebuild(store);
        }

        let bounds: LngLatBounds = host.bounds();
        let zoom = host.zoom();
        let zoom = if zoom.is_finite() { zoom.floor() } else { 0.0 };
        self.partition = self.index.query(bounds, zoom);
        self.refresh_points(store);

        let push = self.push(host);
        ReconcileReport { rebuilt, push }
    }

    /// Point properties are captured at index build time; in-place merges
    /// (status, heading, kind, telemetry) are copied over here.
    fn refresh_points(&mut self, store: &DeviceStore) {
        for point in &mut self.partition.points {
            if let Some(fresh) = store.get(point.device_id.as_str()).and_then(spatial_feature) {
                point.properties = fresh.properties;
            }
        }
    }

    fn push<H: MapHost + ?Sized>(&self, host: &mut H) -> PushOutcome {
        if !sources_ready(host) {
            debug!("cluster sources not mounted yet, skipping push");
            return PushOutcome::HostNotReady;
        }
        let writes = [
            (CLUSTERS_SOURCE, clusters_collection(&self.partition)),
            (POINTS_SOURCE, points_collection(&self.partition)),
        ];
        for (id, data) in writes {
            if let Err(err) = host.set_source_data(id, data) {
                warn!(source = id, %err, "source push failed");
                return PushOutcome::Failed;
            }
        }
        PushOutcome::Pushed
    }
}

#[cfg(test)]
mod tests {
    use foundation::{DeviceId, LngLat, LngLatBounds};
    use pretty_assertions::assert_eq;
    use telemetry::{Device, DevicePatch, DeviceStatus, DeviceStore, FeatureTag};

    use super::{PushOutcome, Reconciler, Trigger, spatial_feature};
    use crate::host::MapHost;
    use crate::recording::RecordingHost;
    use crate::sources::{CLUSTERS_SOURCE, POINTS_SOURCE, install_sources};

    fn store_with(devices: &[(&str, f64, f64)]) -> DeviceStore {
        let mut store = DeviceStore::default();
        store.bulk_set(
            devices
                .iter()
                .map(|(id, lng, lat)| {
                    Device::new(DeviceId::new(*id), FeatureTag::location())
                        .with_position(LngLat::new(*lng, *lat))
                })
                .collect(),
        );
        store
    }

    #[test]
    fn push_before_sources_is_a_silent_no_op() {
        let store = store_with(&[("a", 1.0, 1.0)]);
        let mut host = RecordingHost::new();
        let mut rec = Reconciler::new(FeatureTag::location(), Default::default());

        let report = rec.reconcile(&store, &mut host, Trigger::Mutation { membership_changed: true });
        assert!(report.rebuilt);
        assert_eq!(report.push, PushOutcome::HostNotReady);
        assert_eq!(host.source_writes(), 0);

        install_sources(&mut host).unwrap();
        let report = rec.reconcile(&store, &mut host, Trigger::Viewport);
        assert_eq!(report.push, PushOutcome::Pushed);
        assert_eq!(host.source_writes(), 2);
    }

    #[test]
    fn repeated_passes_push_identical_collections() {
        let store = store_with(&[("a", 1.0, 1.0), ("b", 1.001, 1.0), ("c", 80.0, 10.0)]);
        let mut host = RecordingHost::new();
        install_sources(&mut host).unwrap();
        host.set_viewport(LngLatBounds::WORLD, 3.6);

        let mut rec = Reconciler::new(FeatureTag::location(), Default::default());
        rec.reconcile(&store, &mut host, Trigger::Mutation { membership_changed: true });
        let first = (
            host.source(CLUSTERS_SOURCE).cloned(),
            host.source(POINTS_SOURCE).cloned(),
        );
        rec.reconcile(&store, &mut host, Trigger::Viewport);
        let second = (
            host.source(CLUSTERS_SOURCE).cloned(),
            host.source(POINTS_SOURCE).cloned(),
        );
        assert_eq!(first, second);
        assert_eq!(rec.rebuilds(), 1);
    }

    #[test]
    fn only_the_configured_feature_family_is_indexed() {
        let mut store = store_with(&[("loc", 1.0, 1.0)]);
        store.merge(
            &DeviceId::new("depth"),
            DevicePatch::new()
                .position(LngLat::new(2.0, 2.0))
                .feature(FeatureTag::water_depth()),
        );
        store.merge(&DeviceId::new("nowhere"), DevicePatch::new().kind("truck"));

        let mut host = RecordingHost::new();
        let mut rec = Reconciler::new(FeatureTag::location(), Default::default());
        rec.reconcile(&store, &mut host, Trigger::Mutation { membership_changed: true });
        assert_eq!(rec.index().len(), 1);

        let mut depth = Reconciler::new(FeatureTag::water_depth(), Default::default());
        depth.rebuild(&store);
        assert_eq!(depth.index().features()[0].device_id.as_str(), "depth");
    }

    #[test]
    fn in_place_updates_do_not_rebuild() {
        let store = store_with(&[("a", 1.0, 1.0)]);
        let mut host = RecordingHost::new();
        host.set_viewport(LngLatBounds::WORLD, 16.0);
        let mut rec = Reconciler::new(FeatureTag::location(), Default::default());
        rec.reconcile(&store, &mut host, Trigger::Mutation { membership_changed: true });
        rec.reconcile(&store, &mut host, Trigger::Mutation { membership_changed: false });
        assert_eq!(rec.rebuilds(), 1);
        assert_eq!(rec.partition().points.len(), 1);
        assert_eq!(host.zoom(), 16.0);
    }

    #[test]
    fn in_place_updates_reach_point_properties() {
        let mut store = store_with(&[("a", 1.0, 1.0)]);
        let mut host = RecordingHost::new();
        install_sources(&mut host).unwrap();
        host.set_viewport(LngLatBounds::WORLD, 16.0);
        let mut rec = Reconciler::new(FeatureTag::location(), Default::default());
        rec.reconcile(&store, &mut host, Trigger::Mutation { membership_changed: true });

        let outcome = store.merge(
            &DeviceId::new("a"),
            DevicePatch::new().status(DeviceStatus::Inactive).heading(90.0),
        );
        assert!(!outcome.membership_changed());
        rec.reconcile(&store, &mut host, Trigger::Mutation { membership_changed: false });

        assert_eq!(rec.rebuilds(), 1);
        let props = &rec.partition().points[0].properties;
        assert_eq!(props["active"], false);
        assert_eq!(props["heading"], 90.0);
        let pushed = host.source(POINTS_SOURCE).unwrap();
        assert_eq!(pushed["features"][0]["properties"]["active"], false);
    }

    #[test]
    fn spatial_feature_carries_display_properties() {
        let mut device = Device::new(DeviceId::new("a"), FeatureTag::location())
            .with_kind("truck")
            .with_position(LngLat::new(3.0, 4.0));
        device.properties.insert("speed".into(), 12.into());
        let f = spatial_feature(&device).unwrap();
        assert_eq!(f.properties["kind"], "truck");
        assert_eq!(f.properties["speed"], 12);
        assert_eq!(f.properties["active"], true);

        device.position = None;
        assert!(spatial_feature(&device).is_none());
    }
}
