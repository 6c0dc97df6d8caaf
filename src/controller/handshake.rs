//! Startup rendezvous between the owner and the hook thread
//!
//! Three primitives, created per start attempt:
//!
//! - running: held by the hook thread for as long as the hook is live
//! - control: guards the rendezvous predicate
//! - signal: condition the owner sleeps on while the hook starts up
//!
//! A wake-up alone cannot tell success from failure. The owner decides by
//! trying the running lock after waking: if it can take it, the hook thread
//! is not running.
//!
//! Ordering rules that keep the check race-free:
//!
//! - the hook thread takes `running` before it signals success
//! - it only ever releases `running` while holding `control`, so it cannot
//!   drop it between the owner waking and the owner's try-lock
//! - on failure, `running` is already released when the exit signal fires
//! - the owner releases `control` before joining the hook thread

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard, RawMutex};

/// Owned guard the hook thread keeps while the hook is live
pub(crate) type RunningGuard = lock_api::ArcMutexGuard<RawMutex, ()>;

#[derive(Debug, Default)]
pub(crate) struct Rendezvous {
    signaled: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Handshake {
    running: Arc<Mutex<()>>,
    control: Mutex<Rendezvous>,
    signal: Condvar,
}

impl Handshake {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Owner: take the control lock before spawning the hook thread
    pub(crate) fn lock_control(&self) -> MutexGuard<'_, Rendezvous> {
        self.control.lock()
    }

    /// Owner: sleep until the hook thread signals
    ///
    /// The control lock is released while waiting and held again on return.
    /// Returns `false` if `timeout` elapsed first.
    pub(crate) fn wait_for_signal(
        &self,
        control: &mut MutexGuard<'_, Rendezvous>,
        timeout: Option<Duration>,
    ) -> bool {
        match timeout {
            None => {
                while !control.signaled {
                    self.signal.wait(control);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !control.signaled {
                    if self.signal.wait_until(control, deadline).timed_out() {
                        return control.signaled;
                    }
                }
                true
            }
        }
    }

    /// Owner: true if the hook thread currently holds the running lock
    pub(crate) fn hook_running(&self) -> bool {
        self.running.try_lock().is_none()
    }

    /// Hook thread: mark the hook live
    pub(crate) fn acquire_running(&self) -> RunningGuard {
        self.running.lock_arc()
    }

    /// Hook thread: mark the hook no longer live
    pub(crate) fn release_running(&self, guard: RunningGuard) {
        let _control = self.control.lock();
        drop(guard);
    }

    /// Hook thread: wake the owner
    pub(crate) fn signal(&self) {
        let mut control = self.control.lock();
        control.signaled = true;
        self.signal.notify_one();
    }
}
