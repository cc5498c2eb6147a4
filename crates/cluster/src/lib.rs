pub mod feature;
pub mod geojson;
pub mod index;
pub mod kdtree;
pub mod options;

pub use feature::*;
pub use index::*;
pub use options::*;
