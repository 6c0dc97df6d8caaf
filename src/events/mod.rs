//! Hook lifecycle notifications
//!
//! Broadcast by the controller on every state change that the outside
//! world can act on.

use serde::{Deserialize, Serialize};

/// Events emitted by the hook controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The hook is confirmed running
    HookStarted {
        /// Backend that was started
        backend: String,
    },

    /// The hook was stopped and pressed state cleared
    HookStopped {
        /// How long the hook was running, in milliseconds
        duration_ms: u64,
    },

    /// A start attempt failed
    HookStartFailed {
        /// Numeric status code of the failure
        code: i32,
        /// Human readable cause
        message: String,
    },
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::HookStarted { backend } => write!(f, "HOOK_STARTED ({})", backend),
            LifecycleEvent::HookStopped { duration_ms } => {
                write!(f, "HOOK_STOPPED ({}ms)", duration_ms)
            }
            LifecycleEvent::HookStartFailed { code, message } => {
                write!(f, "HOOK_START_FAILED ({:#X}: {})", code, message)
            }
        }
    }
}
