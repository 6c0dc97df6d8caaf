//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::LifecycleEvent;
use crate::hook::MousePointerState;
use crate::keys::VirtualKeyCode;
use crate::snapshot::MouseMotion;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from an overlay client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Whether one code is currently pressed
    IsPressed { code: VirtualKeyCode },

    /// Pressed flags for a layout plus pointer state, from one snapshot
    Poll { codes: Vec<VirtualKeyCode> },

    /// Ping to check connectivity
    Ping,

    /// Subscribe to hook lifecycle notifications
    Subscribe,
}

/// Responses from the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    Pressed { code: VirtualKeyCode, pressed: bool },

    Poll {
        /// One flag per requested code, in request order
        pressed: Vec<bool>,
        mouse: MousePointerState,
        motion: MouseMotion,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Lifecycle { event: LifecycleEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Hook backend name
    pub backend: String,

    /// Controller state, e.g. `Running` or `Failed(0x30)`
    pub state: String,

    /// Whether the hook thread is alive
    pub hook_alive: bool,

    /// Number of codes pressed right now
    pub pressed_count: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: String::new(),
            state: String::new(),
            hook_alive: false,
            pressed_count: 0,
            uptime_secs: 0,
        }
    }
}
