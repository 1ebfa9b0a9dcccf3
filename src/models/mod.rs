mod delivery;
mod event;
mod stats;
mod subscription;

pub use delivery::*;
pub use event::*;
pub use stats::*;
pub use subscription::*;
