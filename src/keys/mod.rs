//! Key codes and the shared pressed-key registry
//!
//! The registry is the only state the hook thread and the polling side
//! both touch on every event.

mod codes;
mod registry;

pub use codes::{vc, ButtonConvention, VirtualKeyCode, WheelDirection};
pub use registry::{KeyStateRegistry, MAX_SIMULTANEOUS_KEYS};
