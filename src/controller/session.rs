//! Hook-thread side of the controller
//!
//! The session is the only [`Dispatch`] the backend ever sees. Lifecycle
//! events drive the handshake; everything else goes to the translator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::hook::{Dispatch, EventTranslator, HookBackend, HookError, HookEvent, StopToken};

use super::handshake::{Handshake, RunningGuard};

pub(crate) struct HookSession {
    translator: EventTranslator,
    handshake: Arc<Handshake>,
    running: Option<RunningGuard>,
}

impl HookSession {
    pub(crate) fn new(translator: EventTranslator, handshake: Arc<Handshake>) -> Self {
        Self {
            translator,
            handshake,
            running: None,
        }
    }

    fn release(&mut self) {
        if let Some(guard) = self.running.take() {
            self.handshake.release_running(guard);
        }
    }
}

impl Dispatch for HookSession {
    fn dispatch(&mut self, event: &HookEvent) {
        match event {
            HookEvent::Enabled => {
                if self.running.is_none() {
                    self.running = Some(self.handshake.acquire_running());
                }
                debug!("hook enabled");
                self.handshake.signal();
            }
            HookEvent::Disabled => {
                debug!("hook disabled");
                self.release();
            }
            _ => self.translator.translate(event),
        }
    }
}

impl Drop for HookSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Last act of the hook thread, also run when the backend panics
struct ThreadExit {
    translator: EventTranslator,
    handshake: Arc<Handshake>,
    alive: Arc<AtomicBool>,
}

impl Drop for ThreadExit {
    fn drop(&mut self) {
        self.translator.reset();
        self.handshake.signal();
        self.alive.store(false, Ordering::SeqCst);
        debug!("hook thread exiting");
    }
}

/// Body of the hook thread
///
/// `alive` goes false only after the session is gone and the shared state
/// has been cleared, however the backend came to return.
pub(crate) fn run_hook_thread(
    backend: Arc<dyn HookBackend>,
    translator: EventTranslator,
    handshake: Arc<Handshake>,
    stop: StopToken,
    alive: Arc<AtomicBool>,
) -> Result<(), HookError> {
    debug!(backend = backend.name(), "hook thread started");

    let session = HookSession::new(translator.clone(), Arc::clone(&handshake));
    let _exit = ThreadExit {
        translator,
        handshake,
        alive,
    };
    // the session, and with it the running lock, is gone once run returns
    let status = backend.run(Box::new(session), stop);

    if let Err(ref err) = status {
        warn!(code = %format_args!("{:#X}", err.code()), %err, "hook run returned an error");
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::scripted::{Outcome, ScriptedBackend};
    use crate::hook::MouseTracker;
    use crate::keys::{vc, ButtonConvention, KeyStateRegistry};

    fn translator(registry: &Arc<KeyStateRegistry>) -> EventTranslator {
        EventTranslator::new(
            Arc::clone(registry),
            Arc::new(MouseTracker::new()),
            ButtonConvention::Primary,
        )
    }

    fn session() -> (HookSession, Arc<Handshake>, Arc<KeyStateRegistry>) {
        let registry = Arc::new(KeyStateRegistry::new());
        let translator = translator(&registry);
        let handshake = Handshake::new();
        (
            HookSession::new(translator, Arc::clone(&handshake)),
            handshake,
            registry,
        )
    }

    #[test]
    fn test_enable_holds_running_until_disable() {
        let (mut session, handshake, _) = session();
        session.dispatch(&HookEvent::Enabled);
        assert!(handshake.hook_running());

        session.dispatch(&HookEvent::Disabled);
        assert!(!handshake.hook_running());
    }

    #[test]
    fn test_drop_releases_running() {
        let (mut session, handshake, _) = session();
        session.dispatch(&HookEvent::Enabled);
        drop(session);
        assert!(!handshake.hook_running());
    }

    #[test]
    fn test_input_events_reach_registry() {
        let (mut session, _, registry) = session();
        session.dispatch(&HookEvent::Enabled);
        session.dispatch(&HookEvent::KeyPressed { code: vc::SPACE });
        assert!(registry.exists(vc::SPACE));
    }

    #[test]
    fn test_thread_exit_clears_keys_before_reporting_dead() {
        let backend = Arc::new(ScriptedBackend::new(Outcome::RunUntilStopped));
        let registry = Arc::new(KeyStateRegistry::new());
        let handshake = Handshake::new();
        let alive = Arc::new(AtomicBool::new(true));

        let thread = std::thread::spawn({
            let backend = Arc::clone(&backend) as Arc<dyn HookBackend>;
            let translator = translator(&registry);
            let handshake = Arc::clone(&handshake);
            let alive = Arc::clone(&alive);
            move || run_hook_thread(backend, translator, handshake, StopToken::new(), alive)
        });

        while !backend.inject(HookEvent::KeyPressed { code: vc::A }) {
            std::thread::yield_now();
        }
        assert!(registry.exists(vc::A));

        backend.stop();
        while alive.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        assert!(registry.is_empty());
        assert!(!handshake.hook_running());
        assert_eq!(thread.join().unwrap(), Ok(()));
    }
}
