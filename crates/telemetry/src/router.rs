use foundation::ids::DeviceId;
use serde_json::Value;
use tracing::{error, trace, warn};

use crate::device::DevicePatch;
use crate::handlers;
use crate::store::{MergeOutcome, SharedDeviceStore};
use crate::topic::{TopicMatch, TopicPattern};

/// Turns one matched message into a partial device update.
///
/// Returning `None` means the payload carried nothing actionable.
pub trait TopicHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn pattern(&self) -> &TopicPattern;

    /// Topic segment holding the device/entity identifier.
    fn id_segment(&self) -> usize;

    fn handle(&self, topic: &TopicMatch<'_>, payload: &Value) -> Option<DevicePatch>;
}

/// A merged update, as reported back to the caller of `route`.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub device_id: DeviceId,
    pub handler: &'static str,
    pub patch: DevicePatch,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub messages: u64,
    pub decode_errors: u64,
    pub unmatched: u64,
    pub missing_id: u64,
    pub updates: u64,
}

/// Demultiplexes pub/sub messages into device store merges.
///
/// Every handler whose pattern matches runs, in registration order. Nothing
/// here panics or returns an error to the transport: malformed input is
/// logged and dropped.
pub struct TelemetryRouter {
    store: SharedDeviceStore,
    handlers: Vec<Box<dyn TopicHandler>>,
    stats: RouterStats,
}

impl TelemetryRouter {
    pub fn new(store: SharedDeviceStore) -> Self {
        Self {
            store,
            handlers: Vec::new(),
            stats: RouterStats::default(),
        }
    }

    /// A router with the built-in location, status, telemetry and entity
    /// state handlers registered.
    pub fn with_default_handlers(store: SharedDeviceStore) -> Self {
        let mut router = Self::new(store);
        for handler in handlers::default_handlers() {
            router.register(handler);
        }
        router
    }

    pub fn register(&mut self, handler: Box<dyn TopicHandler>) {
        self.handlers.push(handler);
    }

    /// Patterns a transport should subscribe to, deduplicated, in
    /// registration order.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for h in &self.handlers {
            let p = h.pattern().as_str();
            if !out.iter().any(|s| s == p) {
                out.push(p.to_string());
            }
        }
        out
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn store(&self) -> &SharedDeviceStore {
        &self.store
    }

    pub fn route(&mut self, topic: &str, payload: &[u8]) -> Vec<TelemetryEvent> {
        self.stats.messages += 1;

        let matched: Vec<(usize, TopicMatch<'_>)> = self
            .handlers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| h.pattern().matches(topic).map(|m| (idx, m)))
            .collect();
        if matched.is_empty() {
            self.stats.unmatched += 1;
            trace!(topic, "no handler for topic");
            return Vec::new();
        }

        let value: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(err) => {
                self.stats.decode_errors += 1;
                error!(topic, %err, "dropping telemetry payload: invalid JSON");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for (idx, m) in matched {
            let handler = &self.handlers[idx];
            let Some(raw_id) = m.segment(handler.id_segment()) else {
                self.stats.missing_id += 1;
                warn!(
                    topic,
                    handler = handler.name(),
                    "topic has no identifier segment"
                );
                continue;
            };
            let Some(patch) = handler.handle(&m, &value) else {
                trace!(topic, handler = handler.name(), "payload had nothing actionable");
                continue;
            };

            let device_id = DeviceId::new(raw_id);
            let outcome = self.store.lock().merge(&device_id, patch.clone());
            self.stats.updates += 1;
            events.push(TelemetryEvent {
                device_id,
                handler: handler.name(),
                patch,
                outcome,
            });
        }
        events
    }
}

impl std::fmt::Debug for TelemetryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRouter")
            .field("handlers", &self.subscriptions())
            .field("stats", &self.stats)
            .finish()
    }
}
