use std::sync::Arc;

use cluster::{ClusterId, Partition};
use focus::{FocusOutcome, Selection, SelectionChange, cluster_camera};
use foundation::{DeviceId, LngLat, Time};
use layers::{
    CameraTarget, HostEventKind, LifecycleManager, MODEL_OVERLAY, MapHost, ModelType, PushOutcome,
    Reconciler, RepresentationKind, Trigger, install_sources, sources_ready,
};
use runtime::{Callback, ListenerId, ListenerRegistry, NoopProbe, PerformanceProbe, TimerId, TimerQueue};
use telemetry::{BulkOutcome, Device, DeviceStore, SharedDeviceStore, TelemetryRouter, shared_store};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::events::{EngineEvent, SourceInit};
use crate::metrics::{
    CLUSTER_EXPANSIONS, DEVICE_UPDATES, DROPPED_FRAMES, HOST_NOT_READY, INDEX_REBUILDS,
    MESSAGES_ROUTED, Metrics, PARTITION_SIZE, PAYLOADS_REJECTED, PUSH_FAILURES, RECONCILIATIONS,
};

#[derive(Debug)]
enum EngineTimer {
    SourceInit,
}

/// The fleet map core wired to one render host.
///
/// All work happens synchronously inside the calling method: a telemetry
/// message, a store replacement or a host event each runs one
/// recompute-and-push pass against current state. Time only moves through
/// `tick`.
pub struct FleetMap<H: MapHost> {
    host: H,
    config: EngineConfig,
    store: SharedDeviceStore,
    router: TelemetryRouter,
    reconciler: Reconciler,
    lifecycle: LifecycleManager,
    selection: Selection,
    timers: TimerQueue<EngineTimer>,
    source_timer: Option<TimerId>,
    host_listeners: Vec<(ListenerId, HostEventKind)>,
    listeners: ListenerRegistry<Callback<EngineEvent>>,
    metrics: Metrics,
    probe: Box<dyn PerformanceProbe>,
    overlay_added: bool,
    now: Time,
}

impl<H: MapHost> FleetMap<H> {
    pub fn new(host: H, config: EngineConfig) -> Self {
        let store = shared_store(DeviceStore::new(config.feature.clone(), config.history_limit));
        Self::with_store(host, store, config)
    }

    /// Uses an existing store, e.g. one shared with a transport thread.
    pub fn with_store(host: H, store: SharedDeviceStore, config: EngineConfig) -> Self {
        let router = TelemetryRouter::with_default_handlers(Arc::clone(&store));
        Self::with_router(host, router, config)
    }

    /// Uses a router with custom handlers; the store is the router's.
    pub fn with_router(host: H, router: TelemetryRouter, config: EngineConfig) -> Self {
        let store = Arc::clone(router.store());
        let reconciler = Reconciler::new(config.feature.clone(), config.cluster);
        let mut lifecycle = LifecycleManager::new(config.lifecycle());
        let mut host = host;
        let partition = Partition::default();
        lifecycle.set_model_type(&mut host, config.model_type, std::iter::empty(), &partition, Time::ZERO);
        lifecycle.set_clusters_visible(
            &mut host,
            config.clusters_visible,
            std::iter::empty(),
            &partition,
            Time::ZERO,
        );
        Self {
            host,
            config,
            store,
            router,
            reconciler,
            lifecycle,
            selection: Selection::new(),
            timers: TimerQueue::new(),
            source_timer: None,
            host_listeners: Vec::new(),
            listeners: ListenerRegistry::new(),
            metrics: Metrics::new(),
            probe: Box::new(NoopProbe),
            overlay_added: false,
            now: Time::ZERO,
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn PerformanceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> SharedDeviceStore {
        Arc::clone(&self.store)
    }

    pub fn router(&self) -> &TelemetryRouter {
        &self.router
    }

    /// Topic patterns the transport should subscribe to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.router.subscriptions()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn partition(&self) -> &Partition {
        self.reconciler.partition()
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn representation(&self, id: &DeviceId) -> RepresentationKind {
        self.lifecycle.representation(id)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn now(&self) -> Time {
        self.now
    }

    /// Number of devices in the store. The lock is released before returning.
    pub fn device_count(&self) -> usize {
        self.store.lock().len()
    }

    /// Current selection. Never names a device missing from the store.
    pub fn selected(&self) -> Option<DeviceId> {
        let current = self.selection.current()?;
        self.store
            .lock()
            .contains(current.as_str())
            .then(|| current.clone())
    }

    pub fn previous_selection(&self) -> Option<&DeviceId> {
        self.selection.previous()
    }

    pub fn is_attached(&self) -> bool {
        !self.host_listeners.is_empty()
    }

    // ---- engine listeners ----

    pub fn subscribe(&mut self, callback: Callback<EngineEvent>) -> ListenerId {
        self.listeners.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id).is_some()
    }

    fn emit(&mut self, event: EngineEvent) {
        self.listeners.emit(&event);
    }

    // ---- host wiring ----

    /// Subscribes to host events and installs the cluster sources, now if
    /// the style is loaded, else on `style.load` or after the fallback
    /// delay, whichever comes first.
    pub fn attach(&mut self, now: Time) {
        if self.is_attached() {
            return;
        }
        self.now = now;
        for kind in HostEventKind::ALL {
            let id = self.host.subscribe(kind);
            self.host_listeners.push((id, kind));
        }
        if !self.overlay_added {
            self.host.add_control(MODEL_OVERLAY);
            self.overlay_added = true;
        }
        if self.host.is_style_loaded() {
            self.install(SourceInit::AlreadyLoaded);
        } else {
            let due = now.after_millis(self.config.source_init_delay_ms);
            self.source_timer = Some(self.timers.schedule(due, EngineTimer::SourceInit));
        }
    }

    /// Removes exactly the host listeners `attach` added and tears down
    /// every representation.
    pub fn detach(&mut self) {
        for (id, kind) in std::mem::take(&mut self.host_listeners) {
            if !self.host.unsubscribe(id) {
                warn!(?kind, "host listener was already gone");
            }
        }
        self.timers.clear();
        self.source_timer = None;
        self.lifecycle.shutdown(&mut self.host);
    }

    fn listens_to(&self, kind: HostEventKind) -> bool {
        self.host_listeners.iter().any(|(_, k)| *k == kind)
    }

    fn install(&mut self, via: SourceInit) {
        if let Some(timer) = self.source_timer.take() {
            self.timers.cancel(timer);
        }
        match install_sources(&mut self.host) {
            Ok(true) => {
                info!(?via, "cluster sources installed");
                self.emit(EngineEvent::SourcesInstalled(via));
            }
            Ok(false) => debug!(?via, "cluster sources already present"),
            Err(err) => {
                warn!(?via, %err, "installing cluster sources failed");
                return;
            }
        }
        self.reconcile(Trigger::Mutation {
            membership_changed: self.reconciler.rebuilds() == 0,
        });
    }

    /// Dispatches one host event. Events for kinds the engine is not
    /// subscribed to are ignored.
    pub fn handle_host_event(&mut self, kind: HostEventKind) {
        if !self.listens_to(kind) {
            debug!(?kind, "ignoring host event without a listener");
            return;
        }
        match kind {
            HostEventKind::Move | HostEventKind::MoveEnd => self.reconcile(Trigger::Viewport),
            HostEventKind::ZoomEnd => {
                if let Some(change) = self.selection.on_zoom_end(self.lifecycle.clusters_visible()) {
                    self.selection_changed(change);
                }
                self.reconcile(Trigger::Viewport);
            }
            HostEventKind::StyleLoad => self.install(SourceInit::StyleLoad),
        }
    }

    /// Advances engine time: fires the source fallback timer, marker
    /// removals and the focused model's animation.
    pub fn tick(&mut self, now: Time) {
        self.now = now;
        while let Some((_, EngineTimer::SourceInit)) = self.timers.pop_due(now) {
            self.source_timer = None;
            if !sources_ready(&self.host) {
                self.install(SourceInit::FallbackDelay);
            }
        }
        self.lifecycle.tick(&mut self.host, now);
    }

    // ---- data in ----

    /// Routes one transport message. Returns the number of device updates.
    pub fn on_message(&mut self, topic: &str, payload: &[u8]) -> usize {
        let before = self.router.stats();
        let events = self.router.route(topic, payload);
        let after = self.router.stats();

        self.metrics.inc(MESSAGES_ROUTED, 1);
        let rejected = (after.decode_errors - before.decode_errors) + (after.missing_id - before.missing_id);
        if rejected > 0 {
            self.metrics.inc(PAYLOADS_REJECTED, rejected);
        }
        if events.is_empty() {
            return 0;
        }
        self.metrics.inc(DEVICE_UPDATES, events.len() as u64);

        let membership_changed = events.iter().any(|e| e.outcome.membership_changed());
        self.reconcile(Trigger::Mutation { membership_changed });
        events.len()
    }

    /// Replaces the device collection. Devices left out are removed, and a
    /// selection naming one of them is cleared.
    pub fn bulk_set(&mut self, devices: Vec<Device>) -> BulkOutcome {
        let outcome = self.store.lock().bulk_set(devices);
        let change = {
            let store = self.store.lock();
            self.selection.retain_live(&store)
        };
        if let Some(change) = change {
            self.selection_changed(change);
        }
        self.reconcile(Trigger::Mutation {
            membership_changed: true,
        });
        outcome
    }

    // ---- reconciliation ----

    fn reconcile(&mut self, trigger: Trigger) {
        let store = Arc::clone(&self.store);
        let store = store.lock();
        let report = self.reconciler.reconcile(&store, &mut self.host, trigger);

        self.metrics.inc(RECONCILIATIONS, 1);
        if report.rebuilt {
            self.metrics.inc(INDEX_REBUILDS, 1);
        }
        if let Some(dropped) = self.probe.dropped_frames() {
            self.metrics.set_gauge(DROPPED_FRAMES, dropped.min(i64::MAX as u64) as i64);
        }

        let partition = self.reconciler.partition();
        let feature = self.reconciler.feature();
        self.lifecycle
            .sync_devices(&mut self.host, store.by_feature(feature), partition, self.now);
        drop(store);

        let (clusters, points) = partition_len(self.reconciler.partition());
        self.metrics.record(PARTITION_SIZE, (clusters + points) as i64);
        match report.push {
            PushOutcome::Pushed => self.emit(EngineEvent::PartitionPushed { clusters, points }),
            PushOutcome::HostNotReady => self.metrics.inc(HOST_NOT_READY, 1),
            PushOutcome::Failed => self.metrics.inc(PUSH_FAILURES, 1),
        }
    }

    /// Recomputes against the current viewport; what a host `move` event
    /// does.
    pub fn refresh(&mut self) {
        self.reconcile(Trigger::Viewport);
    }

    // ---- modes ----

    pub fn model_type(&self) -> ModelType {
        self.lifecycle.model_type()
    }

    /// Switches 2D/3D. Clears the selection and the focused animation.
    pub fn set_model_type(&mut self, model_type: ModelType) {
        if self.lifecycle.model_type() == model_type {
            return;
        }
        if let Some(change) = self.selection.on_model_type_changed() {
            self.selection_changed(change);
        }
        let store = Arc::clone(&self.store);
        let store = store.lock();
        self.lifecycle.set_model_type(
            &mut self.host,
            model_type,
            store.by_feature(self.reconciler.feature()),
            self.reconciler.partition(),
            self.now,
        );
    }

    pub fn set_clusters_visible(&mut self, visible: bool) {
        let store = Arc::clone(&self.store);
        let store = store.lock();
        self.lifecycle.set_clusters_visible(
            &mut self.host,
            visible,
            store.by_feature(self.reconciler.feature()),
            self.reconciler.partition(),
            self.now,
        );
    }

    // ---- selection ----

    fn selection_changed(&mut self, change: SelectionChange) {
        self.lifecycle.set_focus(&mut self.host, change.current.as_ref());
        self.emit(EngineEvent::SelectionChanged(change));
    }

    pub fn select(&mut self, id: Option<DeviceId>) {
        if let Some(change) = self.selection.select(id) {
            self.selection_changed(change);
        }
    }

    /// Selects a device and flies to it. A device without a position is
    /// left alone.
    pub fn focus(&mut self, id: &DeviceId) -> FocusOutcome {
        let outcome = {
            let store = self.store.lock();
            self.selection
                .focus(&mut self.host, &store, id, self.lifecycle.model_type())
        };
        if let FocusOutcome::Focused { camera, change } = &outcome {
            if let Some(change) = change.clone() {
                self.selection_changed(change);
            }
            self.emit(EngineEvent::CameraMoved(*camera));
        }
        outcome
    }

    /// Flies into a clicked cluster at its expansion zoom, or the fallback
    /// zoom for single-member clusters. `None` if the id is not on screen.
    pub fn expand_cluster(&mut self, id: &ClusterId) -> Option<CameraTarget> {
        let center = self.cluster_center(id)?;
        let zoom = self
            .reconciler
            .index()
            .expansion_zoom_or_fallback(id, self.host.zoom());
        let camera = cluster_camera(center, zoom, self.lifecycle.model_type());
        self.host.fly_to(camera);
        self.metrics.inc(CLUSTER_EXPANSIONS, 1);
        self.emit(EngineEvent::CameraMoved(camera));
        Some(camera)
    }

    fn cluster_center(&self, id: &ClusterId) -> Option<LngLat> {
        if let Some(c) = self.partition().clusters.iter().find(|c| &c.id == id) {
            return Some(c.position);
        }
        match id {
            ClusterId::Single(device) => self.reconciler.index().feature(device).map(|f| f.position),
            ClusterId::Index(_) => None,
        }
    }
}

fn partition_len(p: &Partition) -> (usize, usize) {
    (p.clusters.len(), p.points.len())
}

impl<H: MapHost> Drop for FleetMap<H> {
    fn drop(&mut self) {
        if self.is_attached() {
            self.detach();
        }
    }
}
