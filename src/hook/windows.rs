//! Windows hook using WH_KEYBOARD_LL and WH_MOUSE_LL
//!
//! Both hooks are installed on the hook thread, which then sits in a
//! `GetMessageW` loop. The OS calls the hook procedures on that same thread,
//! so the dispatcher is parked in a thread local for them.
//!
//! # Safety
//!
//! `unsafe` is used only for Win32 FFI calls; each block carries a
//! `// SAFETY:` note.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, info};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT,
    KBDLLHOOKSTRUCT_FLAGS, LLKHF_EXTENDED, MSG, MSLLHOOKSTRUCT, PM_NOREMOVE, WH_KEYBOARD_LL,
    WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN,
    WM_MBUTTONUP, WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP,
    WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP, XBUTTON1,
};

use super::{Dispatch, HookBackend, HookError, HookEvent, Point, StopToken};
use crate::keys::VirtualKeyCode;

thread_local! {
    static DISPATCH: RefCell<Option<Box<dyn Dispatch>>> = RefCell::new(None);
}

/// Low-level hook backend
pub struct LowLevelHookBackend {
    /// Id of the thread inside `run`, 0 when idle
    thread_id: AtomicU32,
    active: Mutex<Option<StopToken>>,
}

impl LowLevelHookBackend {
    pub fn new() -> Self {
        Self {
            thread_id: AtomicU32::new(0),
            active: Mutex::new(None),
        }
    }

    fn finish(&self) {
        self.thread_id.store(0, Ordering::SeqCst);
        *self.active.lock() = None;
    }
}

impl Default for LowLevelHookBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBackend for LowLevelHookBackend {
    fn run(&self, dispatch: Box<dyn Dispatch>, stop: StopToken) -> Result<(), HookError> {
        let mut msg = MSG::default();
        // SAFETY: forces creation of this thread's message queue so a WM_QUIT
        // posted by stop() is never lost.
        unsafe {
            let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
        }
        *self.active.lock() = Some(stop.clone());
        // SAFETY: no preconditions.
        self.thread_id.store(unsafe { GetCurrentThreadId() }, Ordering::SeqCst);

        if stop.is_requested() {
            self.finish();
            return Ok(());
        }

        let hooks = match install_hooks() {
            Ok(hooks) => hooks,
            Err(err) => {
                self.finish();
                return Err(err);
            }
        };

        DISPATCH.with(|slot| *slot.borrow_mut() = Some(dispatch));
        info!("low-level hooks installed");
        with_dispatch(|d| d.dispatch(&HookEvent::Enabled));

        // SAFETY: standard Win32 message loop on the thread owning the hooks.
        unsafe {
            loop {
                let status = GetMessageW(&mut msg, None, 0, 0);
                if status.0 <= 0 {
                    break;
                }
                DispatchMessageW(&msg);
            }
        }

        remove_hooks(hooks);
        with_dispatch(|d| d.dispatch(&HookEvent::Disabled));
        DISPATCH.with(|slot| slot.borrow_mut().take());
        self.finish();

        debug!("low-level hooks removed");
        Ok(())
    }

    fn stop(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            token.request();
        }
        let thread_id = self.thread_id.load(Ordering::SeqCst);
        if thread_id != 0 {
            // SAFETY: posting to a thread id is valid even if the thread has exited.
            unsafe {
                let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
        }
    }

    fn name(&self) -> &'static str {
        "windows_ll_hook"
    }
}

struct Hooks {
    keyboard: HHOOK,
    mouse: HHOOK,
}

fn install_hooks() -> Result<Hooks, HookError> {
    // SAFETY: called on the thread that runs the message loop below.
    let keyboard = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) }
        .map_err(|err| {
            error!(%err, "WH_KEYBOARD_LL installation failed");
            HookError::RegistrationFailed
        })?;

    // SAFETY: as above.
    let mouse = match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) } {
        Ok(mouse) => mouse,
        Err(err) => {
            error!(%err, "WH_MOUSE_LL installation failed");
            // SAFETY: handle returned by the successful call above.
            unsafe {
                let _ = UnhookWindowsHookEx(keyboard);
            }
            return Err(HookError::RegistrationFailed);
        }
    };

    Ok(Hooks { keyboard, mouse })
}

fn remove_hooks(hooks: Hooks) {
    // SAFETY: both handles came from SetWindowsHookExW on this thread.
    unsafe {
        let _ = UnhookWindowsHookEx(hooks.keyboard);
        let _ = UnhookWindowsHookEx(hooks.mouse);
    }
}

fn with_dispatch(f: impl FnOnce(&mut dyn Dispatch)) {
    DISPATCH.with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if let Some(dispatch) = slot.as_mut() {
                f(dispatch.as_mut());
            }
        }
    });
}

/// Low-level keyboard hook callback
///
/// # Safety
///
/// Called by Windows on the hook thread; must return quickly.
unsafe extern "system" fn keyboard_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a KBDLLHOOKSTRUCT when n_code == HC_ACTION.
        let kbs = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
        let extended = (kbs.flags & LLKHF_EXTENDED) != KBDLLHOOKSTRUCT_FLAGS(0);
        let code = VirtualKeyCode::from_scan_code(kbs.scanCode as u16, extended);

        let event = match w_param.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(HookEvent::KeyPressed { code }),
            WM_KEYUP | WM_SYSKEYUP => Some(HookEvent::KeyReleased { code }),
            _ => None,
        };
        if let Some(event) = event {
            with_dispatch(|d| d.dispatch(&event));
        }
    }

    // SAFETY: always forward to the next hook in the chain.
    CallNextHookEx(None, n_code, w_param, l_param)
}

/// Low-level mouse hook callback
///
/// # Safety
///
/// Called by Windows on the hook thread; must return quickly.
unsafe extern "system" fn mouse_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a MSLLHOOKSTRUCT when n_code == HC_ACTION.
        let mhs = &*(l_param.0 as *const MSLLHOOKSTRUCT);
        if let Some(event) = mouse_event(w_param.0 as u32, mhs) {
            with_dispatch(|d| d.dispatch(&event));
        }
    }

    // SAFETY: always forward to the next hook in the chain.
    CallNextHookEx(None, n_code, w_param, l_param)
}

fn mouse_event(message: u32, mhs: &MSLLHOOKSTRUCT) -> Option<HookEvent> {
    let high_word = (mhs.mouseData >> 16) as u16;
    let event = match message {
        WM_MOUSEMOVE => HookEvent::MouseMoved {
            position: Point::new(clamp_coord(mhs.pt.x), clamp_coord(mhs.pt.y)),
        },
        WM_LBUTTONDOWN => HookEvent::MousePressed { button: 1 },
        WM_LBUTTONUP => HookEvent::MouseReleased { button: 1 },
        WM_RBUTTONDOWN => HookEvent::MousePressed { button: 2 },
        WM_RBUTTONUP => HookEvent::MouseReleased { button: 2 },
        WM_MBUTTONDOWN => HookEvent::MousePressed { button: 3 },
        WM_MBUTTONUP => HookEvent::MouseReleased { button: 3 },
        WM_XBUTTONDOWN => HookEvent::MousePressed { button: x_button(high_word) },
        WM_XBUTTONUP => HookEvent::MouseReleased { button: x_button(high_word) },
        WM_MOUSEWHEEL => {
            // positive delta is away from the user
            let delta = i32::from(high_word as i16);
            HookEvent::MouseWheel { rotation: -delta.signum() }
        }
        _ => return None,
    };
    Some(event)
}

fn x_button(high_word: u16) -> u16 {
    if high_word == XBUTTON1 {
        4
    } else {
        5
    }
}

fn clamp_coord(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mouse(data: u32, x: i32, y: i32) -> MSLLHOOKSTRUCT {
        let mut mhs = MSLLHOOKSTRUCT::default();
        mhs.mouseData = data;
        mhs.pt.x = x;
        mhs.pt.y = y;
        mhs
    }

    #[test]
    fn test_mouse_buttons_use_primary_numbering() {
        let mhs = mouse(0, 0, 0);
        assert_eq!(mouse_event(WM_RBUTTONDOWN, &mhs), Some(HookEvent::MousePressed { button: 2 }));
        assert_eq!(mouse_event(WM_MBUTTONUP, &mhs), Some(HookEvent::MouseReleased { button: 3 }));
    }

    #[test]
    fn test_wheel_forward_is_negative_rotation() {
        let mhs = mouse(120 << 16, 0, 0);
        assert_eq!(mouse_event(WM_MOUSEWHEEL, &mhs), Some(HookEvent::MouseWheel { rotation: -1 }));
        let mhs = mouse((-120i16 as u16 as u32) << 16, 0, 0);
        assert_eq!(mouse_event(WM_MOUSEWHEEL, &mhs), Some(HookEvent::MouseWheel { rotation: 1 }));
    }

    #[test]
    fn test_x_buttons() {
        let mhs = mouse(u32::from(XBUTTON1) << 16, 0, 0);
        assert_eq!(mouse_event(WM_XBUTTONDOWN, &mhs), Some(HookEvent::MousePressed { button: 4 }));
    }

    #[test]
    fn test_move_clamps_to_hook_coordinates() {
        let mhs = mouse(0, 70000, -5);
        assert_eq!(
            mouse_event(WM_MOUSEMOVE, &mhs),
            Some(HookEvent::MouseMoved { position: Point::new(i16::MAX, -5) })
        );
    }
}
