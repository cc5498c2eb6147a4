use focus::SelectionChange;
use layers::CameraTarget;

/// How the cluster sources ended up installed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceInit {
    /// The host reported `style.load`.
    StyleLoad,
    /// The host was already loaded when the engine attached.
    AlreadyLoaded,
    /// The fallback delay expired first.
    FallbackDelay,
}

/// Notifications for UI code subscribed through `FleetMap::subscribe`.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SelectionChanged(SelectionChange),
    SourcesInstalled(SourceInit),
    PartitionPushed { clusters: usize, points: usize },
    CameraMoved(CameraTarget),
}
