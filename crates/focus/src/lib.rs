//! Selection and camera focus.

pub mod camera;
pub mod selection;

pub use camera::*;
pub use selection::*;
