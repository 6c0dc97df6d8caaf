//! Linux hook reading evdev devices directly
//!
//! Every `/dev/input/event*` node that reports keys or relative axes is
//! opened non-blocking and swept on a fixed interval until stopped. Relative
//! pointer motion is folded into a virtual absolute position. Requires read
//! access to the devices, usually membership in the `input` group.

use std::io;
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

use evdev::{Device, InputEvent, InputEventKind, Key, RelativeAxisType, Synchronization};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{Dispatch, HookBackend, HookError, HookEvent, Point, StopToken};
use crate::keys::{vc, VirtualKeyCode};

const SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// evdev backend
pub struct EvdevBackend {
    active: Mutex<Option<StopToken>>,
}

impl EvdevBackend {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }
}

impl Default for EvdevBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBackend for EvdevBackend {
    fn run(&self, mut dispatch: Box<dyn Dispatch>, stop: StopToken) -> Result<(), HookError> {
        let mut devices = open_devices();
        if devices.is_empty() {
            warn!("no readable input devices, check /dev/input permissions");
            return Err(HookError::RegistrationFailed);
        }
        *self.active.lock() = Some(stop.clone());

        info!(devices = devices.len(), "evdev devices opened");
        dispatch.dispatch(&HookEvent::Enabled);

        let mut pointer = PointerState::default();
        let mut pending = Vec::new();
        while !stop.is_requested() {
            devices.retain_mut(|device| {
                let swept = match device.fetch_events() {
                    Ok(events) => {
                        for event in events {
                            pointer.apply(&event, &mut pending);
                        }
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                match swept {
                    Ok(()) => true,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => true,
                    Err(err) => {
                        warn!(device = device.name().unwrap_or("unknown"), %err, "dropping input device");
                        false
                    }
                }
            });

            // devices that never send SYN_REPORT
            if let Some(event) = pointer.take_motion() {
                pending.push(event);
            }
            for event in pending.drain(..) {
                dispatch.dispatch(&event);
            }

            thread::sleep(SWEEP_INTERVAL);
        }

        *self.active.lock() = None;
        debug!("evdev sweep stopped");
        dispatch.dispatch(&HookEvent::Disabled);
        Ok(())
    }

    fn stop(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            token.request();
        }
    }

    fn name(&self) -> &'static str {
        "evdev"
    }
}

fn open_devices() -> Vec<Device> {
    evdev::enumerate()
        .filter(|(_, device)| is_input_device(device))
        .filter_map(|(path, device)| match set_nonblocking(&device) {
            Ok(()) => {
                debug!(path = %path.display(), name = device.name().unwrap_or("unknown"), "input device");
                Some(device)
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "cannot make device non-blocking");
                None
            }
        })
        .collect()
}

fn is_input_device(device: &Device) -> bool {
    let has_keys = device
        .supported_keys()
        .map_or(false, |keys| keys.contains(Key::KEY_A) || keys.contains(Key::BTN_LEFT));
    let has_pointer = device
        .supported_relative_axes()
        .map_or(false, |axes| axes.contains(RelativeAxisType::REL_X));
    has_keys || has_pointer
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: fd is owned by `device` and stays open for this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Virtual pointer built from relative motion, plus held-button count
#[derive(Debug, Default)]
struct PointerState {
    x: i32,
    y: i32,
    moved: bool,
    buttons_held: u32,
}

impl PointerState {
    fn apply(&mut self, event: &InputEvent, out: &mut Vec<HookEvent>) {
        match event.kind() {
            InputEventKind::Key(key) => {
                let pressed = event.value() != 0;
                if let Some(button) = button_index(key) {
                    if pressed {
                        // autorepeat reports value 2 and must not count twice
                        if event.value() == 1 {
                            self.buttons_held += 1;
                        }
                        out.push(HookEvent::MousePressed { button });
                    } else {
                        self.buttons_held = self.buttons_held.saturating_sub(1);
                        out.push(HookEvent::MouseReleased { button });
                    }
                } else if let Some(code) = key_code(key) {
                    out.push(if pressed {
                        HookEvent::KeyPressed { code }
                    } else {
                        HookEvent::KeyReleased { code }
                    });
                }
            }
            InputEventKind::RelAxis(RelativeAxisType::REL_X) => {
                self.x = clamp_axis(self.x.saturating_add(event.value()));
                self.moved = true;
            }
            InputEventKind::RelAxis(RelativeAxisType::REL_Y) => {
                self.y = clamp_axis(self.y.saturating_add(event.value()));
                self.moved = true;
            }
            InputEventKind::RelAxis(RelativeAxisType::REL_WHEEL) => {
                // positive wheel values scroll away from the user
                if event.value() != 0 {
                    out.push(HookEvent::MouseWheel { rotation: -event.value().signum() });
                }
            }
            // motion of one report goes out before the buttons of the next
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => {
                out.extend(self.take_motion());
            }
            _ => {}
        }
    }

    /// One motion event for everything accumulated since the last call
    fn take_motion(&mut self) -> Option<HookEvent> {
        if !std::mem::take(&mut self.moved) {
            return None;
        }
        let position = Point::new(self.x as i16, self.y as i16);
        Some(if self.buttons_held > 0 {
            HookEvent::MouseDragged { position }
        } else {
            HookEvent::MouseMoved { position }
        })
    }
}

fn clamp_axis(value: i32) -> i32 {
    value.clamp(0, i32::from(i16::MAX))
}

/// evdev button to X11 numbering (1 left, 2 middle, 3 right)
fn button_index(key: Key) -> Option<u16> {
    let index = match key {
        Key::BTN_LEFT => 1,
        Key::BTN_MIDDLE => 2,
        Key::BTN_RIGHT => 3,
        Key::BTN_SIDE => 4,
        Key::BTN_EXTRA => 5,
        _ => return None,
    };
    Some(index)
}

/// evdev keycode to overlay key code
///
/// The main block of evdev keycodes matches set-1 scan codes; the navigation
/// cluster and right-hand modifiers are remapped to their extended codes.
fn key_code(key: Key) -> Option<VirtualKeyCode> {
    let code = match key {
        Key::KEY_KPENTER => vc::KP_ENTER,
        Key::KEY_RIGHTCTRL => vc::CONTROL_R,
        Key::KEY_KPSLASH => vc::KP_DIVIDE,
        Key::KEY_SYSRQ => vc::PRINTSCREEN,
        Key::KEY_RIGHTALT => vc::ALT_R,
        Key::KEY_PAUSE => vc::PAUSE,
        Key::KEY_HOME => vc::HOME,
        Key::KEY_UP => vc::UP,
        Key::KEY_PAGEUP => vc::PAGE_UP,
        Key::KEY_LEFT => vc::LEFT,
        Key::KEY_RIGHT => vc::RIGHT,
        Key::KEY_END => vc::END,
        Key::KEY_DOWN => vc::DOWN,
        Key::KEY_PAGEDOWN => vc::PAGE_DOWN,
        Key::KEY_INSERT => vc::INSERT,
        Key::KEY_DELETE => vc::DELETE,
        Key::KEY_LEFTMETA => vc::META_L,
        Key::KEY_RIGHTMETA => vc::META_R,
        Key::KEY_COMPOSE => vc::CONTEXT_MENU,
        other => match other.code() {
            raw @ 0x01..=0x58 => VirtualKeyCode::from_scan_code(raw, false),
            _ => return None,
        },
    };
    Some(code)
}
