pub mod frame;
pub mod listeners;
pub mod probe;
pub mod timers;

pub use frame::*;
pub use listeners::*;
pub use probe::*;
pub use timers::*;
