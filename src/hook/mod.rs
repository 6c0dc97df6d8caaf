//! Platform input hooks
//!
//! A backend owns the blocking OS hook loop. It reports lifecycle and input
//! events through a [`Dispatch`] handed to it by the controller and never
//! calls back into the controller any other way.
//!
//! - macOS: listen-only CGEventTap on the hook thread's CFRunLoop
//! - Windows: WH_KEYBOARD_LL / WH_MOUSE_LL on a dedicated message loop
//! - Linux: evdev devices under /dev/input
//! - [`scripted::ScriptedBackend`]: in-memory, for tests

mod error;
mod pointer;
mod translator;

pub mod scripted;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use error::HookError;
pub use pointer::{MousePointerState, MouseTracker, Point};
pub use translator::EventTranslator;

use crate::keys::VirtualKeyCode;

/// Lifecycle and input events delivered by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    /// The hook is installed and events will follow
    Enabled,
    /// The hook is being torn down
    Disabled,
    KeyPressed { code: VirtualKeyCode },
    KeyReleased { code: VirtualKeyCode },
    /// Raw platform button index (1 = left)
    MousePressed { button: u16 },
    MouseReleased { button: u16 },
    /// Negative rotation is away from the user
    MouseWheel { rotation: i32 },
    MouseMoved { position: Point },
    MouseDragged { position: Point },
}

impl HookEvent {
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, HookEvent::Enabled | HookEvent::Disabled)
    }
}

/// Receiver of hook events, called synchronously on the hook thread
///
/// Created on the hook thread and never leaves it.
pub trait Dispatch {
    fn dispatch(&mut self, event: &HookEvent);
}

/// Stop request for exactly one [`HookBackend::run`] call
///
/// A fresh token is handed to every run, so a request that arrives after its
/// run returned cannot leak into the next one.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A blocking platform input hook
pub trait HookBackend: Send + Sync {
    /// Install the hook and block until `stop` is requested or the hook fails
    ///
    /// Must dispatch [`HookEvent::Enabled`] once the hook is live, and
    /// [`HookEvent::Disabled`] before returning after having been enabled.
    /// Must return promptly if `stop` was requested before the loop started.
    fn run(&self, dispatch: Box<dyn Dispatch>, stop: StopToken) -> Result<(), HookError>;

    /// Request stop on the run in progress, if any, and wake its loop
    fn stop(&self);

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Backend for the platform this binary was built for
pub fn native_backend() -> Arc<dyn HookBackend> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::EventTapBackend::new())
    }
    #[cfg(target_os = "windows")]
    {
        Arc::new(windows::LowLevelHookBackend::new())
    }
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::EvdevBackend::new())
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        Arc::new(scripted::ScriptedBackend::new(scripted::Outcome::FailBeforeEnable(
            HookError::DisplayUnavailable,
        )))
    }
}
