//! Global input hook lifecycle and pressed-key registry for input overlays
//!
//! [`HookController`] owns a platform input hook running on its own thread
//! and confirms it came up before `start()` returns. Everything the hook
//! sees lands in a lock-free [`KeyStateRegistry`] plus a smoothed pointer
//! position, which renderers read once per frame through
//! [`HookController::snapshot`].

pub mod config;
pub mod controller;
pub mod events;
pub mod hook;
#[cfg(unix)]
pub mod ipc;
pub mod keys;
pub mod lifecycle;
pub mod snapshot;

pub use controller::{HookController, HookState};
pub use events::LifecycleEvent;
pub use hook::{native_backend, HookBackend, HookError, HookEvent, StopToken};
pub use keys::{vc, ButtonConvention, KeyStateRegistry, VirtualKeyCode};
pub use snapshot::{InputSnapshot, MotionSettings};
