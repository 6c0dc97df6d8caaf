//! Hook lifecycle controller
//!
//! Owns the hook thread and runs the start/stop protocol:
//!
//! ```text
//! Stopped --start()--> Starting --[Enabled]--> Running
//! Starting --[thread exits first]--> Failed(err)
//! Running --stop()--> Stopped
//! Failed(err) --start()--> Starting
//! ```
//!
//! Whole `start()`/`stop()` calls are serialized by one lifecycle lock that
//! sits outside the handshake primitives. A hook thread that exits without
//! being asked turns `Running` into `Stopped` the next time state is read.

mod handshake;
mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::events::LifecycleEvent;
use crate::hook::{
    EventTranslator, HookBackend, HookError, MousePointerState, MouseTracker, StopToken,
};
use crate::keys::{ButtonConvention, KeyStateRegistry, VirtualKeyCode};
use crate::snapshot::InputSnapshot;

use self::handshake::Handshake;

/// Externally visible hook state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HookState {
    /// No hook thread
    #[default]
    Stopped,
    /// `start()` is waiting for the hook thread
    Starting,
    /// The hook is live
    Running,
    /// The last start attempt failed
    Failed(HookError),
}

impl std::fmt::Display for HookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookState::Stopped => write!(f, "Stopped"),
            HookState::Starting => write!(f, "Starting"),
            HookState::Running => write!(f, "Running"),
            HookState::Failed(err) => write!(f, "Failed({:#X})", err.code()),
        }
    }
}

/// Resources that only exist while the hook is running
#[derive(Default)]
struct Lifecycle {
    thread: Option<JoinHandle<Result<(), HookError>>>,
    handshake: Option<Arc<Handshake>>,
    stop: Option<StopToken>,
}

#[derive(Default)]
struct Status {
    state: HookState,
    started_at: Option<Instant>,
}

/// Starts and stops the global input hook and exposes what it observed
pub struct HookController {
    backend: Arc<dyn HookBackend>,
    registry: Arc<KeyStateRegistry>,
    mouse: Arc<MouseTracker>,
    convention: ButtonConvention,
    start_timeout: Option<Duration>,
    lifecycle: Mutex<Lifecycle>,
    status: Mutex<Status>,
    /// Cleared by the hook thread as its last act
    hook_alive: Arc<AtomicBool>,
    event_tx: Option<broadcast::Sender<LifecycleEvent>>,
}

impl HookController {
    /// Create a stopped controller for `backend`
    pub fn new(backend: Arc<dyn HookBackend>) -> Self {
        Self {
            backend,
            registry: Arc::new(KeyStateRegistry::new()),
            mouse: Arc::new(MouseTracker::new()),
            convention: ButtonConvention::native(),
            start_timeout: None,
            lifecycle: Mutex::new(Lifecycle::default()),
            status: Mutex::new(Status::default()),
            hook_alive: Arc::new(AtomicBool::new(false)),
            event_tx: None,
        }
    }

    /// Override the mouse button numbering of the backend
    pub fn with_convention(mut self, convention: ButtonConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Give up on a start attempt that has not resolved after `timeout`
    pub fn with_start_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Publish lifecycle events on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<LifecycleEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Start the hook thread and block until it is running or has failed
    ///
    /// Calling this while already running is a successful no-op. There is
    /// no automatic retry.
    pub fn start(&self) -> Result<(), HookError> {
        let mut lifecycle = self.lifecycle.lock();

        if lifecycle.thread.is_some() {
            if self.hook_alive.load(Ordering::SeqCst) {
                debug!("hook already running");
                return Ok(());
            }
            warn!("hook thread exited on its own, restarting");
            self.teardown(&mut lifecycle);
        }

        self.set_state(HookState::Starting);
        self.registry.clear();
        self.mouse.reset();

        let handshake = Handshake::new();
        let stop = StopToken::new();
        let mut control = handshake.lock_control();

        let translator = EventTranslator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.mouse),
            self.convention,
        );
        self.hook_alive.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new().name("input-hook".to_string()).spawn({
            let backend = Arc::clone(&self.backend);
            let handshake = Arc::clone(&handshake);
            let stop = stop.clone();
            let alive = Arc::clone(&self.hook_alive);
            move || session::run_hook_thread(backend, translator, handshake, stop, alive)
        });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.hook_alive.store(false, Ordering::SeqCst);
                drop(control);
                return Err(self.fail(HookError::ThreadCreateFailed(e.to_string())));
            }
        };

        let signaled = handshake.wait_for_signal(&mut control, self.start_timeout);

        if signaled && handshake.hook_running() {
            // the hook cannot release running, and so cannot exit, until `control` drops
            self.set_state(HookState::Running);
            info!(backend = self.backend.name(), "input hook running");
            self.emit(LifecycleEvent::HookStarted {
                backend: self.backend.name().to_string(),
            });
            drop(control);

            lifecycle.thread = Some(thread);
            lifecycle.handshake = Some(handshake);
            lifecycle.stop = Some(stop);
            return Ok(());
        }

        // the hook thread is finishing with `control` released; never join while holding it
        drop(control);

        if !signaled {
            warn!(timeout = ?self.start_timeout, "hook start timed out, stopping backend");
            stop.request();
            self.backend.stop();
        }

        let status = match thread.join() {
            Ok(status) => status,
            Err(_) => {
                error!("hook thread panicked during startup");
                Err(HookError::Unknown)
            }
        };

        let err = match (signaled, status) {
            (false, _) => HookError::StartTimeout,
            (true, Err(err)) => err,
            // returned success without ever being confirmed running
            (true, Ok(())) => HookError::Unknown,
        };
        Err(self.fail(err))
    }

    /// Stop the hook and wait for its thread to exit
    ///
    /// A no-op unless the hook is running.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();

        if lifecycle.thread.is_none() {
            debug!(state = %self.state(), "stop requested while hook not running");
            return;
        }
        self.teardown(&mut lifecycle);
    }

    /// Current state
    ///
    /// Never blocks behind a `start()` or `stop()` in progress.
    pub fn state(&self) -> HookState {
        if !self.hook_alive.load(Ordering::SeqCst) {
            self.mark_stopped();
        }
        self.status.lock().state.clone()
    }

    /// True while the hook thread exists and has not finished
    pub fn is_hook_thread_alive(&self) -> bool {
        self.hook_alive.load(Ordering::SeqCst)
    }

    /// Is `code` currently held
    pub fn is_pressed(&self, code: VirtualKeyCode) -> bool {
        self.registry.exists(code)
    }

    /// Current, previous and smoothed pointer positions
    pub fn mouse_state(&self) -> MousePointerState {
        self.mouse.state()
    }

    /// Everything a renderer needs for one frame
    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot::capture(&self.registry, &self.mouse)
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Join the hook thread and drop everything that belonged to the run
    fn teardown(&self, lifecycle: &mut Lifecycle) {
        let Some(thread) = lifecycle.thread.take() else {
            return;
        };

        if let Some(stop) = lifecycle.stop.take() {
            stop.request();
        }
        if self.hook_alive.load(Ordering::SeqCst) {
            self.backend.stop();
        }
        match thread.join() {
            Ok(Ok(())) => debug!("hook thread joined"),
            Ok(Err(err)) => warn!(%err, "hook thread exited with error"),
            Err(_) => error!("hook thread panicked"),
        }

        lifecycle.handshake = None;
        self.registry.clear();
        self.mouse.reset();
        self.mark_stopped();
    }

    /// `Running` to `Stopped`, announced once per run
    fn mark_stopped(&self) {
        let mut status = self.status.lock();
        if status.state != HookState::Running {
            return;
        }
        let duration_ms = status
            .started_at
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        debug!(from = %status.state, to = %HookState::Stopped, "hook state transition");
        status.state = HookState::Stopped;
        drop(status);

        info!(duration_ms, "input hook stopped");
        self.emit(LifecycleEvent::HookStopped { duration_ms });
    }

    fn fail(&self, err: HookError) -> HookError {
        error!(code = %format_args!("{:#X}", err.code()), %err, "failed to start input hook");
        self.set_state(HookState::Failed(err.clone()));
        self.emit(LifecycleEvent::HookStartFailed {
            code: err.code(),
            message: err.to_string(),
        });
        err
    }

    fn set_state(&self, state: HookState) {
        let mut status = self.status.lock();
        if status.state != state {
            debug!(from = %status.state, to = %state, "hook state transition");
            if state == HookState::Running {
                status.started_at = Some(Instant::now());
            }
            status.state = state;
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        if let Some(tx) = &self.event_tx {
            // no subscribers is fine
            let _ = tx.send(event);
        }
    }
}

impl Drop for HookController {
    fn drop(&mut self) {
        self.stop();
    }
}
