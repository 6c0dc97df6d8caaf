//! Per-frame view of hook state for renderers
//!
//! A renderer captures one [`InputSnapshot`] per tick and answers every
//! "is this key down" and pointer question from it, so a frame never mixes
//! two different moments of input.

use serde::{Deserialize, Serialize};

use crate::hook::{MousePointerState, MouseTracker};
use crate::keys::{KeyStateRegistry, VirtualKeyCode};

/// Pressed codes and pointer state at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    pressed: Vec<VirtualKeyCode>,
    mouse: MousePointerState,
}

impl InputSnapshot {
    pub fn capture(registry: &KeyStateRegistry, mouse: &MouseTracker) -> Self {
        Self {
            pressed: registry.pressed(),
            mouse: mouse.state(),
        }
    }

    pub fn is_pressed(&self, code: VirtualKeyCode) -> bool {
        !code.is_undefined() && self.pressed.contains(&code)
    }

    /// Pressed flag for each code, in order
    ///
    /// Used to light up the keys of a loaded layout.
    pub fn resolve(&self, codes: &[VirtualKeyCode]) -> Vec<bool> {
        if self.pressed.is_empty() {
            return vec![false; codes.len()];
        }
        codes.iter().map(|&code| self.is_pressed(code)).collect()
    }

    pub fn pressed(&self) -> &[VirtualKeyCode] {
        &self.pressed
    }

    pub fn mouse(&self) -> MousePointerState {
        self.mouse
    }

    /// Pointer displacement under `settings`
    pub fn motion(&self, settings: &MotionSettings) -> MouseMotion {
        let current = self.mouse.current;
        let (origin_x, origin_y) = settings.center.unwrap_or((
            i32::from(self.mouse.previous.x),
            i32::from(self.mouse.previous.y),
        ));
        MouseMotion {
            dx: i32::from(current.x) - origin_x,
            dy: i32::from(current.y) - origin_y,
        }
    }
}

/// How pointer displacement is measured and scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionSettings {
    /// Displacements smaller than this on either axis count as no movement
    pub dead_zone: i32,
    /// Displacement that maps to a full-scale factor of 1
    pub max_movement: i32,
    /// Measure from this fixed point instead of the previous position
    pub center: Option<(i32, i32)>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            dead_zone: 0,
            max_movement: 50,
            center: None,
        }
    }
}

/// Pointer displacement for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MouseMotion {
    pub dx: i32,
    pub dy: i32,
}

impl MouseMotion {
    /// Displacement scaled by `max_movement` and clamped to [-1, 1]
    pub fn factor(&self, max_movement: i32) -> (f64, f64) {
        if max_movement == 0 {
            return (0.0, 0.0);
        }
        let scale = f64::from(max_movement);
        (
            (f64::from(self.dx) / scale).clamp(-1.0, 1.0),
            (f64::from(self.dy) / scale).clamp(-1.0, 1.0),
        )
    }

    /// True if either axis moved less than `dead_zone`
    pub fn in_dead_zone(&self, dead_zone: i32) -> bool {
        self.dx.abs() < dead_zone || self.dy.abs() < dead_zone
    }

    /// Arrow angle in radians, pointing along the displacement
    pub fn angle(&self) -> f64 {
        std::f64::consts::FRAC_PI_2 + f64::from(self.dy).atan2(f64::from(self.dx))
    }
}

/// Direction arrow that holds its last heading inside the dead zone
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArrowHeading {
    angle: f64,
}

impl ArrowHeading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame of motion and get the angle to draw
    pub fn update(&mut self, motion: MouseMotion, dead_zone: i32) -> f64 {
        if !motion.in_dead_zone(dead_zone) {
            self.angle = motion.angle();
        }
        self.angle
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::Point;
    use crate::keys::vc;

    fn snapshot_with(codes: &[VirtualKeyCode], moves: &[Point]) -> InputSnapshot {
        let registry = KeyStateRegistry::new();
        let mouse = MouseTracker::new();
        for &code in codes {
            registry.add(code);
        }
        for &position in moves {
            mouse.record_motion(position);
        }
        InputSnapshot::capture(&registry, &mouse)
    }

    #[test]
    fn test_resolve_layout_keys() {
        let snapshot = snapshot_with(&[vc::W, vc::SHIFT_L], &[]);
        let layout = [vc::W, vc::A, vc::S, vc::D, vc::SHIFT_L];
        assert_eq!(
            snapshot.resolve(&layout),
            vec![true, false, false, false, true]
        );
    }

    #[test]
    fn test_resolve_when_nothing_pressed() {
        let snapshot = snapshot_with(&[], &[]);
        assert_eq!(snapshot.resolve(&[vc::A, vc::B]), vec![false, false]);
        assert!(!snapshot.is_pressed(VirtualKeyCode::UNDEFINED));
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = KeyStateRegistry::new();
        let mouse = MouseTracker::new();
        registry.add(vc::E);
        let snapshot = InputSnapshot::capture(&registry, &mouse);
        registry.remove(vc::E);
        assert!(snapshot.is_pressed(vc::E));
    }

    #[test]
    fn test_motion_relative_to_previous() {
        let snapshot = snapshot_with(&[], &[Point::new(100, 100), Point::new(130, 90)]);
        let motion = snapshot.motion(&MotionSettings::default());
        assert_eq!(motion, MouseMotion { dx: 30, dy: -10 });
    }

    #[test]
    fn test_motion_relative_to_center() {
        let snapshot = snapshot_with(&[], &[Point::new(1000, 500)]);
        let settings = MotionSettings {
            center: Some((960, 540)),
            ..MotionSettings::default()
        };
        assert_eq!(snapshot.motion(&settings), MouseMotion { dx: 40, dy: -40 });
    }

    #[test]
    fn test_factor_is_clamped() {
        let motion = MouseMotion { dx: 25, dy: -200 };
        assert_eq!(motion.factor(50), (0.5, -1.0));
        assert_eq!(motion.factor(0), (0.0, 0.0));
    }

    #[test]
    fn test_dead_zone_on_either_axis() {
        assert!(MouseMotion { dx: 20, dy: 1 }.in_dead_zone(5));
        assert!(!MouseMotion { dx: 20, dy: -6 }.in_dead_zone(5));
        assert!(!MouseMotion { dx: 0, dy: 0 }.in_dead_zone(0));
    }

    #[test]
    fn test_arrow_holds_heading_in_dead_zone() {
        let mut arrow = ArrowHeading::new();
        let right = arrow.update(MouseMotion { dx: 10, dy: 10 }, 5);
        let expected = std::f64::consts::FRAC_PI_2 + std::f64::consts::FRAC_PI_4;
        assert!((right - expected).abs() < 1e-9);

        let held = arrow.update(MouseMotion { dx: 1, dy: 40 }, 5);
        assert_eq!(held, right);
        assert_eq!(arrow.angle(), right);
    }
}
