//! Scripted hook backend
//!
//! Lets tests drive the start/stop handshake and inject synthetic events
//! without an OS hook.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};

use parking_lot::Mutex;

use super::{Dispatch, HookBackend, HookError, HookEvent, StopToken};

/// What the next `run()` call does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Enable, deliver injected events, disable on stop
    RunUntilStopped,
    /// Return the error without ever enabling
    FailBeforeEnable(HookError),
    /// Return success without ever enabling
    ExitBeforeEnable,
    /// Block until stopped without ever enabling
    NeverEnable,
}

enum Command {
    Event(HookEvent, Sender<()>),
    Stop,
}

/// In-memory [`HookBackend`] with a configurable outcome
pub struct ScriptedBackend {
    outcome: Mutex<Outcome>,
    commands: Mutex<Option<Sender<Command>>>,
    active: Mutex<Option<StopToken>>,
    runs: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            commands: Mutex::new(None),
            active: Mutex::new(None),
            runs: AtomicUsize::new(0),
        }
    }

    /// Change what subsequent runs do
    pub fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock() = outcome;
    }

    /// Number of times `run()` has been entered
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Deliver an event on the hook thread and wait until it was dispatched
    ///
    /// Returns `false` if no run is currently accepting events.
    pub fn inject(&self, event: HookEvent) -> bool {
        let (ack_tx, ack_rx) = mpsc::channel();
        let sent = match self.commands.lock().as_ref() {
            Some(tx) => tx.send(Command::Event(event, ack_tx)).is_ok(),
            None => false,
        };
        sent && ack_rx.recv().is_ok()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(Outcome::RunUntilStopped)
    }
}

impl HookBackend for ScriptedBackend {
    fn run(&self, mut dispatch: Box<dyn Dispatch>, stop: StopToken) -> Result<(), HookError> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        let outcome = self.outcome.lock().clone();
        match outcome {
            Outcome::FailBeforeEnable(err) => return Err(err),
            Outcome::ExitBeforeEnable => return Ok(()),
            Outcome::RunUntilStopped | Outcome::NeverEnable => {}
        }

        let (tx, rx) = mpsc::channel();
        *self.commands.lock() = Some(tx);
        *self.active.lock() = Some(stop.clone());

        let enabled = outcome == Outcome::RunUntilStopped;
        if enabled {
            dispatch.dispatch(&HookEvent::Enabled);
        }

        if !stop.is_requested() {
            for command in rx {
                match command {
                    Command::Event(event, ack) => {
                        dispatch.dispatch(&event);
                        let _ = ack.send(());
                    }
                    Command::Stop => break,
                }
            }
        }

        *self.commands.lock() = None;
        *self.active.lock() = None;

        if enabled {
            dispatch.dispatch(&HookEvent::Disabled);
        }
        Ok(())
    }

    fn stop(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            token.request();
        }
        if let Some(tx) = self.commands.lock().take() {
            let _ = tx.send(Command::Stop);
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct Recorder(Arc<Mutex<Vec<HookEvent>>>);

    impl Dispatch for Recorder {
        fn dispatch(&mut self, event: &HookEvent) {
            self.0.lock().push(*event);
        }
    }

    #[test]
    fn test_failure_returns_without_events() {
        let backend = ScriptedBackend::new(Outcome::FailBeforeEnable(HookError::OutOfMemory));
        let events = Arc::new(Mutex::new(Vec::new()));
        let result = backend.run(Box::new(Recorder(Arc::clone(&events))), StopToken::new());
        assert_eq!(result, Err(HookError::OutOfMemory));
        assert!(events.lock().is_empty());
        assert_eq!(backend.runs(), 1);
    }

    #[test]
    fn test_run_delivers_injected_events_in_order() {
        let backend = Arc::new(ScriptedBackend::default());
        let events = Arc::new(Mutex::new(Vec::new()));

        let runner = {
            let backend = Arc::clone(&backend);
            let events = Arc::clone(&events);
            thread::spawn(move || backend.run(Box::new(Recorder(events)), StopToken::new()))
        };

        while !backend.inject(HookEvent::MouseWheel { rotation: -1 }) {
            thread::yield_now();
        }
        assert!(backend.inject(HookEvent::MousePressed { button: 1 }));
        backend.stop();
        assert_eq!(runner.join().unwrap(), Ok(()));

        let events = events.lock();
        assert_eq!(events.first(), Some(&HookEvent::Enabled));
        assert_eq!(events.last(), Some(&HookEvent::Disabled));
        let pos_wheel = events
            .iter()
            .position(|e| *e == HookEvent::MouseWheel { rotation: -1 })
            .unwrap();
        assert_eq!(events[pos_wheel + 1], HookEvent::MousePressed { button: 1 });
    }

    #[test]
    fn test_stop_between_runs_does_not_cancel_next_run() {
        let backend = Arc::new(ScriptedBackend::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let result = backend.run(Box::new(Recorder(Arc::clone(&events))), {
            let token = StopToken::new();
            token.request();
            token
        });
        assert_eq!(result, Ok(()));

        // Nothing is running, so this must not reach the next run
        backend.stop();

        let runner = {
            let backend = Arc::clone(&backend);
            let events = Arc::clone(&events);
            thread::spawn(move || backend.run(Box::new(Recorder(events)), StopToken::new()))
        };
        while !backend.inject(HookEvent::KeyPressed { code: crate::keys::VirtualKeyCode(0x1E) }) {
            thread::yield_now();
        }
        assert!(!runner.is_finished());
        backend.stop();
        assert_eq!(runner.join().unwrap(), Ok(()));
        assert_eq!(backend.runs(), 2);
    }

    #[test]
    fn test_token_requested_before_run_returns_promptly() {
        let backend = ScriptedBackend::new(Outcome::NeverEnable);
        let token = StopToken::new();
        token.request();
        let events = Arc::new(Mutex::new(Vec::new()));
        assert_eq!(backend.run(Box::new(Recorder(Arc::clone(&events))), token), Ok(()));
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_inject_without_run_is_rejected() {
        let backend = ScriptedBackend::default();
        assert!(!backend.inject(HookEvent::Enabled));
    }
}
