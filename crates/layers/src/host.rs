use foundation::{DeviceId, Handle, LngLat, LngLatBounds};
use runtime::ListenerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::orientation::Orientation;
use crate::sources::LayerSpec;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("source `{0}` is not mounted")]
    MissingSource(String),
    #[error("source `{0}` already exists")]
    DuplicateSource(String),
    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),
    #[error("layer `{layer}` references missing source `{source_id}`")]
    LayerWithoutSource { layer: String, source_id: String },
    #[error("stale or unknown handle {0:?}")]
    StaleHandle(Handle),
}

/// Host events the engine listens to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostEventKind {
    Move,
    MoveEnd,
    ZoomEnd,
    StyleLoad,
}

impl HostEventKind {
    pub const ALL: [HostEventKind; 4] = [
        HostEventKind::Move,
        HostEventKind::MoveEnd,
        HostEventKind::ZoomEnd,
        HostEventKind::StyleLoad,
    ];
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraTarget {
    pub center: LngLat,
    pub zoom: f64,
    pub pitch: f64,
    pub duration_ms: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerHandle(pub Handle);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelHandle(pub Handle);

/// Lifecycle CSS classes applied to marker elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarkerClass {
    FadeIn,
    FadeOut,
    Focused,
}

impl MarkerClass {
    pub fn css(self) -> &'static str {
        match self {
            MarkerClass::FadeIn => "marker-fade-in",
            MarkerClass::FadeOut => "marker-fade-out",
            MarkerClass::Focused => "marker-focused",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub device_id: DeviceId,
    pub position: LngLat,
    pub kind: String,
    pub active: bool,
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub device_id: DeviceId,
    pub position: LngLat,
    /// Model asset key; the device kind.
    pub model: String,
    pub orientation: Orientation,
}

/// Capability interface of a map/render host.
///
/// Any host exposing this shape is substitutable. Calls are synchronous and
/// happen on the host's event-loop thread.
pub trait MapHost {
    fn is_style_loaded(&self) -> bool;

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, data: Value) -> Result<(), HostError>;
    /// Replaces the source contents wholesale; the host diffs internally.
    fn set_source_data(&mut self, id: &str, data: Value) -> Result<(), HostError>;
    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), HostError>;
    fn add_control(&mut self, name: &str);

    fn fly_to(&mut self, camera: CameraTarget);
    fn bounds(&self) -> LngLatBounds;
    fn zoom(&self) -> f64;

    /// Registers interest in `kind`; the returned id is the only way to
    /// remove it.
    fn subscribe(&mut self, kind: HostEventKind) -> ListenerId;
    fn unsubscribe(&mut self, id: ListenerId) -> bool;

    fn mount_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerHandle, HostError>;
    fn update_marker(&mut self, handle: MarkerHandle, spec: &MarkerSpec) -> Result<(), HostError>;
    fn add_marker_class(&mut self, handle: MarkerHandle, class: MarkerClass) -> Result<(), HostError>;
    fn remove_marker_class(&mut self, handle: MarkerHandle, class: MarkerClass) -> Result<(), HostError>;
    fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), HostError>;

    fn mount_model(&mut self, spec: &ModelSpec) -> Result<ModelHandle, HostError>;
    fn update_model(&mut self, handle: ModelHandle, spec: &ModelSpec) -> Result<(), HostError>;
    fn remove_model(&mut self, handle: ModelHandle) -> Result<(), HostError>;
}
