//! Device telemetry: the device data model, the process-wide device state
//! store, and the topic router that turns pub/sub messages into store merges.

pub mod device;
pub mod handlers;
pub mod router;
pub mod store;
pub mod topic;

pub use device::*;
pub use router::*;
pub use store::*;
pub use topic::*;
