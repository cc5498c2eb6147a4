//! Render-side bookkeeping: the map host capability interface, the two
//! backing cluster sources, viewport reconciliation and per-device
//! representation lifecycle.

pub mod host;
pub mod lifecycle;
pub mod orientation;
pub mod reconcile;
pub mod recording;
pub mod sources;

pub use host::*;
pub use lifecycle::*;
pub use orientation::*;
pub use reconcile::*;
pub use recording::RecordingHost;
pub use sources::*;
