use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::ids::DeviceId;
use parking_lot::Mutex;
use tracing::debug;

use crate::device::{Device, DevicePatch, FeatureTag};

/// Default cap on per-device position history.
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

/// What a single `merge` did to the store.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub created: bool,
    pub position_changed: bool,
    pub feature_changed: bool,
}

impl MergeOutcome {
    /// True when the spatial index over this device's feature family is stale.
    pub fn membership_changed(&self) -> bool {
        self.created || self.position_changed || self.feature_changed
    }
}

/// What a `bulk_set` did to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub added: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
    pub total: usize,
}

/// Authoritative map from device id to current device state.
///
/// Ordering contract:
/// - `all` and `by_feature` iterate in ascending `DeviceId` order.
///
/// There is no caching between writes and reads: every read sees the last
/// committed write.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    devices: BTreeMap<DeviceId, Device>,
    default_feature: FeatureTag,
    history_limit: usize,
    revision: u64,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new(FeatureTag::location(), DEFAULT_HISTORY_LIMIT)
    }
}

impl DeviceStore {
    pub fn new(default_feature: FeatureTag, history_limit: usize) -> Self {
        Self {
            devices: BTreeMap::new(),
            default_feature,
            history_limit,
            revision: 0,
        }
    }

    /// Bumped on every committed write.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Device> + '_ {
        self.devices.values()
    }

    pub fn by_feature<'a>(&'a self, tag: &'a FeatureTag) -> impl Iterator<Item = &'a Device> + 'a {
        self.devices.values().filter(move |d| &d.feature == tag)
    }

    /// Replaces the whole collection.
    ///
    /// Later entries win over earlier ones with the same id, so the store
    /// never holds two records for one id.
    pub fn bulk_set(&mut self, devices: Vec<Device>) -> BulkOutcome {
        let mut next: BTreeMap<DeviceId, Device> = BTreeMap::new();
        for device in devices {
            if device.id.is_empty() {
                debug!("bulk_set: skipping device with empty id");
                continue;
            }
            next.insert(device.id.clone(), device);
        }

        let added = next
            .keys()
            .filter(|id| !self.devices.contains_key(*id))
            .cloned()
            .collect();
        let removed = self
            .devices
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();

        self.devices = next;
        self.revision += 1;
        BulkOutcome {
            added,
            removed,
            total: self.devices.len(),
        }
    }

    /// Shallow-merges `patch` onto the record for `id`, creating it with
    /// defaults when absent.
    pub fn merge(&mut self, id: &DeviceId, patch: DevicePatch) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let history_limit = self.history_limit;
        let device = self.devices.entry(id.clone()).or_insert_with(|| {
            outcome.created = true;
            Device::new(id.clone(), self.default_feature.clone())
        });

        if let Some(kind) = patch.kind {
            device.kind = kind;
        }
        if let Some(status) = patch.status {
            device.status = status;
        }
        if let Some(heading) = patch.heading {
            device.heading = Some(heading);
        }
        if let Some(feature) = patch.feature
            && feature != device.feature
        {
            device.feature = feature;
            outcome.feature_changed = !outcome.created;
        }
        if let Some(position) = patch.position
            && device.position != Some(position)
        {
            if let Some(previous) = device.position {
                device.history.push(previous);
                let overflow = device.history.len().saturating_sub(history_limit);
                device.history.drain(..overflow);
            }
            device.position = Some(position);
            outcome.position_changed = true;
        }
        for (key, value) in patch.properties {
            device.properties.insert(key, value);
        }

        self.revision += 1;
        outcome
    }
}

/// Store handle for hosts that deliver telemetry from more than one thread.
pub type SharedDeviceStore = Arc<Mutex<DeviceStore>>;

pub fn shared_store(store: DeviceStore) -> SharedDeviceStore {
    Arc::new(Mutex::new(store))
}

#[cfg(test)]
mod tests {
    use super::DeviceStore;
    use crate::device::{Device, DevicePatch, DeviceStatus, FeatureTag};
    use foundation::ids::DeviceId;
    use foundation::position::LngLat;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn id(s: &str) -> DeviceId {
        DeviceId::new(s)
    }

    #[test]
    fn merge_is_additive_over_properties() {
        let mut store = DeviceStore::default();
        store.merge(&id("d1"), DevicePatch::new().property("a", json!(1)));
        store.merge(&id("d1"), DevicePatch::new().property("b", json!(2)));

        let d = store.get("d1").unwrap();
        assert_eq!(d.properties.get("a"), Some(&json!(1)));
        assert_eq!(d.properties.get("b"), Some(&json!(2)));
        assert_eq!(d.status, DeviceStatus::Active);
        assert_eq!(d.feature, FeatureTag::location());
        assert!(d.history.is_empty());
    }

    #[test]
    fn merge_overwrites_same_key() {
        let mut store = DeviceStore::default();
        store.merge(&id("d1"), DevicePatch::new().property("a", json!(1)));
        store.merge(&id("d1"), DevicePatch::new().property("a", json!(5)));
        assert_eq!(store.get("d1").unwrap().properties.get("a"), Some(&json!(5)));
    }

    #[test]
    fn merge_reports_membership_changes() {
        let mut store = DeviceStore::default();
        let o = store.merge(&id("d1"), DevicePatch::new().position(LngLat::new(1.0, 1.0)));
        assert!(o.created && o.position_changed);

        let o = store.merge(&id("d1"), DevicePatch::new().position(LngLat::new(1.0, 1.0)));
        assert!(!o.membership_changed());

        let o = store.merge(&id("d1"), DevicePatch::new().property("temp", json!(20)));
        assert!(!o.membership_changed());

        let o = store.merge(&id("d1"), DevicePatch::new().position(LngLat::new(2.0, 1.0)));
        assert!(o.position_changed && !o.created);

        let o = store.merge(&id("d1"), DevicePatch::new().feature(FeatureTag::water_depth()));
        assert!(o.feature_changed);
    }

    #[test]
    fn history_keeps_previous_positions_up_to_limit() {
        let mut store = DeviceStore::new(FeatureTag::location(), 2);
        for x in 0..4 {
            store.merge(&id("d1"), DevicePatch::new().position(LngLat::new(x as f64, 0.0)));
        }
        let d = store.get("d1").unwrap();
        assert_eq!(d.position, Some(LngLat::new(3.0, 0.0)));
        assert_eq!(d.history, vec![LngLat::new(1.0, 0.0), LngLat::new(2.0, 0.0)]);
    }

    #[test]
    fn bulk_set_replaces_and_dedups() {
        let mut store = DeviceStore::default();
        store.merge(&id("stale"), DevicePatch::new());

        let out = store.bulk_set(vec![
            Device::new(id("a"), FeatureTag::location()).with_kind("old"),
            Device::new(id("b"), FeatureTag::water_depth()),
            Device::new(id("a"), FeatureTag::location()).with_kind("new"),
        ]);

        assert_eq!(out.added, vec![id("a"), id("b")]);
        assert_eq!(out.removed, vec![id("stale")]);
        assert_eq!(out.total, 2);
        assert_eq!(store.get("a").unwrap().kind, "new");
        assert!(!store.contains("stale"));
    }

    #[test]
    fn by_feature_reflects_latest_write() {
        let mut store = DeviceStore::default();
        store.merge(&id("a"), DevicePatch::new());
        store.merge(&id("b"), DevicePatch::new().feature(FeatureTag::water_depth()));

        let loc = FeatureTag::location();
        let ids: Vec<_> = store.by_feature(&loc).map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        store.merge(&id("a"), DevicePatch::new().feature(FeatureTag::water_depth()));
        assert_eq!(store.by_feature(&loc).count(), 0);
    }
}
