//! Virtual key code definitions
//!
//! Keyboard codes use the set-1 scan code layout that overlay layout files
//! are written against. Mouse buttons and wheel pulses share the same code
//! space under a reserved mask so a single registry can track both.

use serde::{Deserialize, Serialize};

/// Opaque 16-bit identifier of a pressable input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualKeyCode(pub u16);

impl VirtualKeyCode {
    /// Empty registry slot marker
    pub const UNDEFINED: Self = Self(0x0000);

    /// Bits reserved for mouse button composites
    pub const MOUSE_MASK: u16 = 0xED00;

    /// Synthetic code asserted for one dispatch after a wheel-up pulse
    pub const MOUSE_WHEEL_UP: Self = Self(Self::MOUSE_MASK | 0x11);
    /// Synthetic code asserted for one dispatch after a wheel-down pulse
    pub const MOUSE_WHEEL_DOWN: Self = Self(Self::MOUSE_MASK | 0x12);

    /// Raw numeric value
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// True for the empty-slot marker
    pub const fn is_undefined(self) -> bool {
        self.0 == Self::UNDEFINED.0
    }

    /// Composite code for an already-normalized mouse button index
    pub const fn mouse_button(index: u16) -> Self {
        Self(Self::MOUSE_MASK | index)
    }

    /// True for mouse button composites and the wheel synthetics
    pub const fn is_mouse(self) -> bool {
        self.0 & 0xFF00 == Self::MOUSE_MASK
    }

    /// Build a keyboard code from a hardware scan code and extended-key flag
    ///
    /// Arrow keys carry the `0xE0` prefix, every other extended key `0x0E`.
    pub fn from_scan_code(scan: u16, extended: bool) -> Self {
        let scan = scan & 0x00FF;
        if !extended {
            return Self(scan);
        }
        match scan {
            0x48 | 0x4B | 0x4D | 0x50 => Self(0xE000 | scan),
            _ => Self(0x0E00 | scan),
        }
    }
}

impl From<u16> for VirtualKeyCode {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for VirtualKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

/// Named keyboard codes
#[allow(missing_docs)]
pub mod vc {
    use super::VirtualKeyCode as Vk;

    pub const ESCAPE: Vk = Vk(0x0001);
    pub const NUM_1: Vk = Vk(0x0002);
    pub const NUM_2: Vk = Vk(0x0003);
    pub const NUM_3: Vk = Vk(0x0004);
    pub const NUM_4: Vk = Vk(0x0005);
    pub const NUM_5: Vk = Vk(0x0006);
    pub const NUM_6: Vk = Vk(0x0007);
    pub const NUM_7: Vk = Vk(0x0008);
    pub const NUM_8: Vk = Vk(0x0009);
    pub const NUM_9: Vk = Vk(0x000A);
    pub const NUM_0: Vk = Vk(0x000B);
    pub const MINUS: Vk = Vk(0x000C);
    pub const EQUALS: Vk = Vk(0x000D);
    pub const BACKSPACE: Vk = Vk(0x000E);
    pub const TAB: Vk = Vk(0x000F);
    pub const Q: Vk = Vk(0x0010);
    pub const W: Vk = Vk(0x0011);
    pub const E: Vk = Vk(0x0012);
    pub const R: Vk = Vk(0x0013);
    pub const T: Vk = Vk(0x0014);
    pub const Y: Vk = Vk(0x0015);
    pub const U: Vk = Vk(0x0016);
    pub const I: Vk = Vk(0x0017);
    pub const O: Vk = Vk(0x0018);
    pub const P: Vk = Vk(0x0019);
    pub const OPEN_BRACKET: Vk = Vk(0x001A);
    pub const CLOSE_BRACKET: Vk = Vk(0x001B);
    pub const ENTER: Vk = Vk(0x001C);
    pub const CONTROL_L: Vk = Vk(0x001D);
    pub const A: Vk = Vk(0x001E);
    pub const S: Vk = Vk(0x001F);
    pub const D: Vk = Vk(0x0020);
    pub const F: Vk = Vk(0x0021);
    pub const G: Vk = Vk(0x0022);
    pub const H: Vk = Vk(0x0023);
    pub const J: Vk = Vk(0x0024);
    pub const K: Vk = Vk(0x0025);
    pub const L: Vk = Vk(0x0026);
    pub const SEMICOLON: Vk = Vk(0x0027);
    pub const QUOTE: Vk = Vk(0x0028);
    pub const BACKQUOTE: Vk = Vk(0x0029);
    pub const SHIFT_L: Vk = Vk(0x002A);
    pub const BACK_SLASH: Vk = Vk(0x002B);
    pub const Z: Vk = Vk(0x002C);
    pub const X: Vk = Vk(0x002D);
    pub const C: Vk = Vk(0x002E);
    pub const V: Vk = Vk(0x002F);
    pub const B: Vk = Vk(0x0030);
    pub const N: Vk = Vk(0x0031);
    pub const M: Vk = Vk(0x0032);
    pub const COMMA: Vk = Vk(0x0033);
    pub const PERIOD: Vk = Vk(0x0034);
    pub const SLASH: Vk = Vk(0x0035);
    pub const SHIFT_R: Vk = Vk(0x0036);
    pub const KP_MULTIPLY: Vk = Vk(0x0037);
    pub const ALT_L: Vk = Vk(0x0038);
    pub const SPACE: Vk = Vk(0x0039);
    pub const CAPS_LOCK: Vk = Vk(0x003A);
    pub const F1: Vk = Vk(0x003B);
    pub const F2: Vk = Vk(0x003C);
    pub const F3: Vk = Vk(0x003D);
    pub const F4: Vk = Vk(0x003E);
    pub const F5: Vk = Vk(0x003F);
    pub const F6: Vk = Vk(0x0040);
    pub const F7: Vk = Vk(0x0041);
    pub const F8: Vk = Vk(0x0042);
    pub const F9: Vk = Vk(0x0043);
    pub const F10: Vk = Vk(0x0044);
    pub const NUM_LOCK: Vk = Vk(0x0045);
    pub const SCROLL_LOCK: Vk = Vk(0x0046);
    pub const KP_7: Vk = Vk(0x0047);
    pub const KP_8: Vk = Vk(0x0048);
    pub const KP_9: Vk = Vk(0x0049);
    pub const KP_SUBTRACT: Vk = Vk(0x004A);
    pub const KP_4: Vk = Vk(0x004B);
    pub const KP_5: Vk = Vk(0x004C);
    pub const KP_6: Vk = Vk(0x004D);
    pub const KP_ADD: Vk = Vk(0x004E);
    pub const KP_1: Vk = Vk(0x004F);
    pub const KP_2: Vk = Vk(0x0050);
    pub const KP_3: Vk = Vk(0x0051);
    pub const KP_0: Vk = Vk(0x0052);
    pub const KP_SEPARATOR: Vk = Vk(0x0053);
    pub const F11: Vk = Vk(0x0057);
    pub const F12: Vk = Vk(0x0058);

    pub const KP_ENTER: Vk = Vk(0x0E1C);
    pub const CONTROL_R: Vk = Vk(0x0E1D);
    pub const KP_DIVIDE: Vk = Vk(0x0E35);
    pub const PRINTSCREEN: Vk = Vk(0x0E37);
    pub const ALT_R: Vk = Vk(0x0E38);
    pub const PAUSE: Vk = Vk(0x0E45);
    pub const HOME: Vk = Vk(0x0E47);
    pub const PAGE_UP: Vk = Vk(0x0E49);
    pub const END: Vk = Vk(0x0E4F);
    pub const PAGE_DOWN: Vk = Vk(0x0E51);
    pub const INSERT: Vk = Vk(0x0E52);
    pub const DELETE: Vk = Vk(0x0E53);
    pub const META_L: Vk = Vk(0x0E5B);
    pub const META_R: Vk = Vk(0x0E5C);
    pub const CONTEXT_MENU: Vk = Vk(0x0E5D);

    pub const UP: Vk = Vk(0xE048);
    pub const LEFT: Vk = Vk(0xE04B);
    pub const RIGHT: Vk = Vk(0xE04D);
    pub const DOWN: Vk = Vk(0xE050);
}

/// Direction of a single wheel pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    /// Away from the user
    Up,
    /// Toward the user
    Down,
}

impl WheelDirection {
    /// Classify a rotation amount; negative rotation is up
    pub fn from_rotation(rotation: i32) -> Option<Self> {
        match rotation.signum() {
            -1 => Some(Self::Up),
            1 => Some(Self::Down),
            _ => None,
        }
    }

    /// Synthetic code asserted for this direction
    pub fn code(self) -> VirtualKeyCode {
        match self {
            Self::Up => VirtualKeyCode::MOUSE_WHEEL_UP,
            Self::Down => VirtualKeyCode::MOUSE_WHEEL_DOWN,
        }
    }
}

/// How a platform numbers the right and middle mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonConvention {
    /// 2 is right, 3 is middle (Windows); layouts are authored against this
    Primary,
    /// 2 is middle, 3 is right (X11, macOS backends)
    Swapped,
}

impl ButtonConvention {
    /// Convention of the hook backend compiled for this target
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            Self::Primary
        } else {
            Self::Swapped
        }
    }

    /// Translate a raw button index into its composite code
    pub fn to_code(self, button: u16) -> VirtualKeyCode {
        let index = match (self, button) {
            (Self::Swapped, 2) => 3,
            (Self::Swapped, 3) => 2,
            (_, other) => other,
        };
        VirtualKeyCode::mouse_button(index)
    }
}

impl Default for ButtonConvention {
    fn default() -> Self {
        Self::native()
    }
}
