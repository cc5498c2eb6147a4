use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use cluster::ClusterId;
use cluster::geojson::{clusters_collection, points_collection};
use engine::{FleetMap, MetricsSnapshot};
use foundation::{DeviceId, LngLatBounds, Time};
use layers::{ModelType, RecordingHost};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use telemetry::Device;
use tracing::{debug, warn};

use crate::pump;

/// One line of a recording. `t` is seconds since the start.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default)]
    t: f64,
    #[serde(flatten)]
    event: ReplayEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReplayEvent {
    Message { topic: String, payload: Value },
    Devices { devices: Vec<Device> },
    Viewport { bounds: LngLatBounds, zoom: f64 },
    Select { device: Option<DeviceId> },
    Focus { device: DeviceId },
    ExpandCluster { cluster: String },
    ModelType { model_type: ModelType },
    ClustersVisible { visible: bool },
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub lines: usize,
    pub skipped: usize,
    pub devices: usize,
    pub selected: Option<DeviceId>,
    pub clusters: Value,
    pub points: Value,
    pub metrics: MetricsSnapshot,
}

pub fn read_devices(path: &Path) -> Result<Vec<Device>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading devices {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing devices {}", path.display()))
}

pub fn run(map: &mut FleetMap<RecordingHost>, path: &Path) -> Result<Summary> {
    let file = File::open(path).with_context(|| format!("opening replay {}", path.display()))?;
    map.attach(Time::ZERO);

    let mut lines = 0;
    let mut skipped = 0;
    let mut last_t = 0.0;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", n + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;
        let parsed: ReplayLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(line = n + 1, %err, "skipping malformed replay line");
                skipped += 1;
                continue;
            }
        };
        // Recordings may be slightly out of order; time never runs backwards.
        last_t = parsed.t.max(last_t);
        map.tick(Time(last_t));
        apply(map, parsed.event);
        pump(map);
    }
    map.tick(Time(last_t + 1.0));

    let devices = map.device_count();
    let selected = map.selected();
    let partition = map.partition();
    Ok(Summary {
        lines,
        skipped,
        devices,
        selected,
        clusters: clusters_collection(partition),
        points: points_collection(partition),
        metrics: map.metrics().snapshot(),
    })
}

fn apply(map: &mut FleetMap<RecordingHost>, event: ReplayEvent) {
    match event {
        ReplayEvent::Message { topic, payload } => {
            let bytes = match payload {
                Value::String(raw) => raw.into_bytes(),
                other => other.to_string().into_bytes(),
            };
            map.on_message(&topic, &bytes);
        }
        ReplayEvent::Devices { devices } => {
            let outcome = map.bulk_set(devices);
            debug!(added = outcome.added.len(), removed = outcome.removed.len(), "device list replaced");
        }
        ReplayEvent::Viewport { bounds, zoom } => map.host_mut().set_viewport(bounds, zoom),
        ReplayEvent::Select { device } => map.select(device),
        ReplayEvent::Focus { device } => {
            map.focus(&device);
        }
        ReplayEvent::ExpandCluster { cluster } => match ClusterId::parse(&cluster) {
            Some(id) => {
                if map.expand_cluster(&id).is_none() {
                    debug!(%cluster, "cluster not on screen");
                }
            }
            None => warn!(%cluster, "invalid cluster id"),
        },
        ReplayEvent::ModelType { model_type } => map.set_model_type(model_type),
        ReplayEvent::ClustersVisible { visible } => map.set_clusters_visible(visible),
    }
}
