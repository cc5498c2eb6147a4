use cluster::geojson::empty_collection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::host::{HostError, MapHost};

pub const CLUSTERS_SOURCE: &str = "clusters";
pub const POINTS_SOURCE: &str = "unclustered-points";
/// Host control that carries the 3D model scenegraph.
pub const MODEL_OVERLAY: &str = "fleet-model-overlay";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Circle,
    Symbol,
}

/// Declarative render layer over one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    pub kind: LayerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub paint: Value,
    #[serde(default)]
    pub layout: Value,
}

/// Layers drawn over the two backing sources.
pub fn cluster_layers() -> Vec<LayerSpec> {
    vec![
        LayerSpec {
            id: "cluster-circles".into(),
            source: CLUSTERS_SOURCE.into(),
            kind: LayerKind::Circle,
            filter: Some(json!(["has", "point_count"])),
            paint: json!({
                "circle-color": ["step", ["get", "point_count"], "#51bbd6", 10, "#f1f075", 100, "#f28cb1"],
                "circle-radius": ["step", ["get", "point_count"], 16, 10, 22, 100, 30],
            }),
            layout: Value::Null,
        },
        LayerSpec {
            id: "cluster-count".into(),
            source: CLUSTERS_SOURCE.into(),
            kind: LayerKind::Symbol,
            filter: Some(json!(["has", "point_count"])),
            paint: Value::Null,
            layout: json!({ "text-field": ["get", "point_count_abbreviated"], "text-size": 12 }),
        },
        LayerSpec {
            id: "unclustered-point".into(),
            source: POINTS_SOURCE.into(),
            kind: LayerKind::Circle,
            filter: None,
            paint: json!({ "circle-color": "#11b4da", "circle-radius": 6 }),
            layout: Value::Null,
        },
    ]
}

/// True once both backing sources exist on the host.
pub fn sources_ready<H: MapHost + ?Sized>(host: &H) -> bool {
    host.has_source(CLUSTERS_SOURCE) && host.has_source(POINTS_SOURCE)
}

/// Adds whatever sources and layers are missing. Safe to call repeatedly.
///
/// Returns `true` if anything was added.
pub fn install_sources<H: MapHost + ?Sized>(host: &mut H) -> Result<bool, HostError> {
    let mut added = false;
    for id in [CLUSTERS_SOURCE, POINTS_SOURCE] {
        if !host.has_source(id) {
            host.add_source(id, empty_collection())?;
            added = true;
        }
    }
    for layer in cluster_layers() {
        if !host.has_layer(&layer.id) {
            host.add_layer(layer)?;
            added = true;
        }
    }
    if added {
        debug!("cluster sources installed");
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::{CLUSTERS_SOURCE, POINTS_SOURCE, cluster_layers, install_sources, sources_ready};
    use crate::recording::RecordingHost;

    #[test]
    fn install_is_idempotent() {
        let mut host = RecordingHost::new();
        assert!(!sources_ready(&host));
        assert!(install_sources(&mut host).unwrap());
        assert!(sources_ready(&host));
        assert!(!install_sources(&mut host).unwrap());
        assert_eq!(host.layer_ids().len(), cluster_layers().len());
    }

    #[test]
    fn every_layer_targets_a_backing_source() {
        for layer in cluster_layers() {
            assert!(layer.source == CLUSTERS_SOURCE || layer.source == POINTS_SOURCE);
        }
    }
}
