//! Raw hook event to registry translation
//!
//! Runs on the hook thread for every event, so it must stay allocation-free
//! and bounded by the registry capacity.

use std::sync::Arc;

use crate::keys::{ButtonConvention, KeyStateRegistry, VirtualKeyCode, WheelDirection};

use super::pointer::MouseTracker;
use super::HookEvent;

/// Applies input events to the shared registry and pointer state
#[derive(Debug, Clone)]
pub struct EventTranslator {
    registry: Arc<KeyStateRegistry>,
    mouse: Arc<MouseTracker>,
    convention: ButtonConvention,
}

impl EventTranslator {
    pub fn new(
        registry: Arc<KeyStateRegistry>,
        mouse: Arc<MouseTracker>,
        convention: ButtonConvention,
    ) -> Self {
        Self {
            registry,
            mouse,
            convention,
        }
    }

    /// Apply one event
    pub fn translate(&self, event: &HookEvent) {
        if event.is_lifecycle() {
            return;
        }

        // wheel presses are pulses with no release; drop the previous one first
        self.registry.remove(VirtualKeyCode::MOUSE_WHEEL_UP);
        self.registry.remove(VirtualKeyCode::MOUSE_WHEEL_DOWN);

        match *event {
            HookEvent::KeyPressed { code } => {
                if !self.registry.exists(code) {
                    self.registry.add(code);
                }
            }
            HookEvent::KeyReleased { code } => {
                if self.registry.exists(code) {
                    self.registry.remove(code);
                }
            }
            HookEvent::MousePressed { button } => {
                let code = self.convention.to_code(button);
                if !self.registry.exists(code) {
                    self.registry.add(code);
                }
            }
            HookEvent::MouseReleased { button } => {
                let code = self.convention.to_code(button);
                if self.registry.exists(code) {
                    self.registry.remove(code);
                }
            }
            HookEvent::MouseWheel { rotation } => {
                if let Some(direction) = WheelDirection::from_rotation(rotation) {
                    let code = direction.code();
                    if !self.registry.exists(code) {
                        self.registry.add(code);
                    }
                }
            }
            HookEvent::MouseMoved { position } | HookEvent::MouseDragged { position } => {
                self.mouse.record_motion(position);
            }
            HookEvent::Enabled | HookEvent::Disabled => {}
        }
    }

    pub fn registry(&self) -> &Arc<KeyStateRegistry> {
        &self.registry
    }

    /// Forget all held codes and pointer history
    pub fn reset(&self) {
        self.registry.clear();
        self.mouse.reset();
    }
}
