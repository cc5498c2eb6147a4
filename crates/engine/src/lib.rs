//! Top-level wiring of the fleet map core.
//!
//! `FleetMap` is the one place where the shared device store, the router,
//! the cluster index and the render host meet. Everything below it takes
//! its collaborators by argument.

pub mod config;
pub mod events;
pub mod map;
pub mod metrics;

pub use config::*;
pub use events::*;
pub use map::*;
pub use metrics::*;
