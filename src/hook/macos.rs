//! macOS hook using a listen-only CGEventTap
//!
//! The tap callback only forwards translated events over a channel. The
//! hook thread pumps its own CFRunLoop in short slices, drains the channel
//! into the dispatcher and checks the stop flag between slices.

use std::sync::mpsc;
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{Dispatch, HookBackend, HookError, HookEvent, Point, StopToken};
use crate::keys::{vc, VirtualKeyCode};

const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

enum TapMessage {
    Event(HookEvent),
    /// macOS turned the tap off after a slow callback or user input
    Disabled,
}

/// CGEventTap backend
pub struct EventTapBackend {
    active: Mutex<Option<StopToken>>,
}

impl EventTapBackend {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }
}

impl Default for EventTapBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBackend for EventTapBackend {
    fn run(&self, mut dispatch: Box<dyn Dispatch>, stop: StopToken) -> Result<(), HookError> {
        let (tx, rx) = mpsc::channel::<TapMessage>();

        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            let message = match event_type {
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    Some(TapMessage::Disabled)
                }
                _ => translate(event_type, event).map(TapMessage::Event),
            };
            if let Some(message) = message {
                let _ = tx.send(message);
            }
            None
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
                CGEventType::LeftMouseDown,
                CGEventType::LeftMouseUp,
                CGEventType::RightMouseDown,
                CGEventType::RightMouseUp,
                CGEventType::OtherMouseDown,
                CGEventType::OtherMouseUp,
                CGEventType::MouseMoved,
                CGEventType::LeftMouseDragged,
                CGEventType::RightMouseDragged,
                CGEventType::OtherMouseDragged,
                CGEventType::ScrollWheel,
            ],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap, is Accessibility permission granted?");
            HookError::RegistrationFailed
        })?;

        let source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HookError::RunLoopUnavailable)?;
        let run_loop = CFRunLoop::get_current();
        // SAFETY: kCFRunLoopCommonModes is a static CFString provided by CoreFoundation.
        unsafe {
            run_loop.add_source(&source, kCFRunLoopCommonModes);
        }
        tap.enable();
        *self.active.lock() = Some(stop.clone());

        info!("event tap enabled");
        dispatch.dispatch(&HookEvent::Enabled);

        while !stop.is_requested() {
            // SAFETY: kCFRunLoopDefaultMode is a static CFString provided by CoreFoundation.
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
            }

            while let Ok(message) = rx.try_recv() {
                match message {
                    TapMessage::Event(event) => dispatch.dispatch(&event),
                    TapMessage::Disabled => {
                        warn!("event tap disabled by the system, re-enabling");
                        tap.enable();
                    }
                }
            }
        }

        // SAFETY: same static mode string the source was added with.
        unsafe {
            run_loop.remove_source(&source, kCFRunLoopCommonModes);
        }
        *self.active.lock() = None;

        debug!("event tap removed");
        dispatch.dispatch(&HookEvent::Disabled);
        Ok(())
    }

    fn stop(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            token.request();
        }
    }

    fn name(&self) -> &'static str {
        "cg_event_tap"
    }
}

fn translate(event_type: CGEventType, event: &CGEvent) -> Option<HookEvent> {
    match event_type {
        CGEventType::KeyDown => Some(HookEvent::KeyPressed { code: key_code(event)? }),
        CGEventType::KeyUp => Some(HookEvent::KeyReleased { code: key_code(event)? }),
        CGEventType::FlagsChanged => {
            let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            let code = key_from_cg(keycode)?;
            let flag = modifier_flag(keycode)?;
            if event.get_flags().contains(flag) {
                Some(HookEvent::KeyPressed { code })
            } else {
                Some(HookEvent::KeyReleased { code })
            }
        }
        CGEventType::LeftMouseDown | CGEventType::RightMouseDown | CGEventType::OtherMouseDown => {
            Some(HookEvent::MousePressed { button: button(event) })
        }
        CGEventType::LeftMouseUp | CGEventType::RightMouseUp | CGEventType::OtherMouseUp => {
            Some(HookEvent::MouseReleased { button: button(event) })
        }
        CGEventType::MouseMoved => Some(HookEvent::MouseMoved { position: position(event) }),
        CGEventType::LeftMouseDragged
        | CGEventType::RightMouseDragged
        | CGEventType::OtherMouseDragged => {
            Some(HookEvent::MouseDragged { position: position(event) })
        }
        CGEventType::ScrollWheel => {
            let delta = event.get_integer_value_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_1);
            // positive CG delta scrolls up
            Some(HookEvent::MouseWheel { rotation: -(delta.signum() as i32) })
        }
        _ => None,
    }
}

fn key_code(event: &CGEvent) -> Option<VirtualKeyCode> {
    key_from_cg(event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE))
}

/// CG button number to X11 numbering (1 left, 2 middle, 3 right)
fn button(event: &CGEvent) -> u16 {
    let number = event.get_integer_value_field(EventField::MOUSE_EVENT_BUTTON_NUMBER);
    cg_button_to_x11(number)
}

fn cg_button_to_x11(number: i64) -> u16 {
    match number {
        0 => 1,
        1 => 3,
        2 => 2,
        n => u16::try_from(n + 1).unwrap_or(u16::MAX),
    }
}

fn position(event: &CGEvent) -> Point {
    let location = event.location();
    Point::new(clamp_coord(location.x), clamp_coord(location.y))
}

fn clamp_coord(value: f64) -> i16 {
    value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

fn modifier_flag(keycode: i64) -> Option<CGEventFlags> {
    let flag = match keycode {
        0x38 | 0x3C => CGEventFlags::CGEventFlagShift,
        0x3B | 0x3E => CGEventFlags::CGEventFlagControl,
        0x3A | 0x3D => CGEventFlags::CGEventFlagAlternate,
        0x37 | 0x36 => CGEventFlags::CGEventFlagCommand,
        0x39 => CGEventFlags::CGEventFlagAlphaShift,
        _ => return None,
    };
    Some(flag)
}

/// macOS virtual keycode to overlay key code
fn key_from_cg(keycode: i64) -> Option<VirtualKeyCode> {
    let code = match keycode {
        0x00 => vc::A,
        0x01 => vc::S,
        0x02 => vc::D,
        0x03 => vc::F,
        0x04 => vc::H,
        0x05 => vc::G,
        0x06 => vc::Z,
        0x07 => vc::X,
        0x08 => vc::C,
        0x09 => vc::V,
        0x0B => vc::B,
        0x0C => vc::Q,
        0x0D => vc::W,
        0x0E => vc::E,
        0x0F => vc::R,
        0x10 => vc::Y,
        0x11 => vc::T,
        0x12 => vc::NUM_1,
        0x13 => vc::NUM_2,
        0x14 => vc::NUM_3,
        0x15 => vc::NUM_4,
        0x16 => vc::NUM_6,
        0x17 => vc::NUM_5,
        0x18 => vc::EQUALS,
        0x19 => vc::NUM_9,
        0x1A => vc::NUM_7,
        0x1B => vc::MINUS,
        0x1C => vc::NUM_8,
        0x1D => vc::NUM_0,
        0x1E => vc::CLOSE_BRACKET,
        0x1F => vc::O,
        0x20 => vc::U,
        0x21 => vc::OPEN_BRACKET,
        0x22 => vc::I,
        0x23 => vc::P,
        0x24 => vc::ENTER,
        0x25 => vc::L,
        0x26 => vc::J,
        0x27 => vc::QUOTE,
        0x28 => vc::K,
        0x29 => vc::SEMICOLON,
        0x2A => vc::BACK_SLASH,
        0x2B => vc::COMMA,
        0x2C => vc::SLASH,
        0x2D => vc::N,
        0x2E => vc::M,
        0x2F => vc::PERIOD,
        0x30 => vc::TAB,
        0x31 => vc::SPACE,
        0x32 => vc::BACKQUOTE,
        0x33 => vc::BACKSPACE,
        0x35 => vc::ESCAPE,
        0x36 => vc::META_R,
        0x37 => vc::META_L,
        0x38 => vc::SHIFT_L,
        0x39 => vc::CAPS_LOCK,
        0x3A => vc::ALT_L,
        0x3B => vc::CONTROL_L,
        0x3C => vc::SHIFT_R,
        0x3D => vc::ALT_R,
        0x3E => vc::CONTROL_R,
        0x41 => vc::KP_SEPARATOR,
        0x43 => vc::KP_MULTIPLY,
        0x45 => vc::KP_ADD,
        0x47 => vc::NUM_LOCK,
        0x4B => vc::KP_DIVIDE,
        0x4C => vc::KP_ENTER,
        0x4E => vc::KP_SUBTRACT,
        0x52 => vc::KP_0,
        0x53 => vc::KP_1,
        0x54 => vc::KP_2,
        0x55 => vc::KP_3,
        0x56 => vc::KP_4,
        0x57 => vc::KP_5,
        0x58 => vc::KP_6,
        0x59 => vc::KP_7,
        0x5B => vc::KP_8,
        0x5C => vc::KP_9,
        0x60 => vc::F5,
        0x61 => vc::F6,
        0x62 => vc::F7,
        0x63 => vc::F3,
        0x64 => vc::F8,
        0x65 => vc::F9,
        0x67 => vc::F11,
        0x6D => vc::F10,
        0x6E => vc::CONTEXT_MENU,
        0x6F => vc::F12,
        0x72 => vc::INSERT,
        0x73 => vc::HOME,
        0x74 => vc::PAGE_UP,
        0x75 => vc::DELETE,
        0x76 => vc::F4,
        0x77 => vc::END,
        0x78 => vc::F2,
        0x79 => vc::PAGE_DOWN,
        0x7A => vc::F1,
        0x7B => vc::LEFT,
        0x7C => vc::RIGHT,
        0x7D => vc::DOWN,
        0x7E => vc::UP,
        _ => return None,
    };
    Some(code)
}
