//! Mouse pointer position tracking with exponential smoothing

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Screen position in hook coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Current, previous and smoothed pointer positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MousePointerState {
    /// Position reported by the latest motion event
    pub current: Point,
    /// Position reported by the motion event before that
    pub previous: Point,
    /// `(previous * 4 + current + 4) / 5` per axis
    pub smoothed: Point,
}

impl MousePointerState {
    /// Shift `current` into `previous`, store `position`, recompute smoothing
    pub fn advance(&mut self, position: Point) {
        self.previous = self.current;
        self.current = position;
        self.smoothed = Point::new(
            smooth(self.previous.x, self.current.x),
            smooth(self.previous.y, self.current.y),
        );
    }
}

fn smooth(previous: i16, current: i16) -> i16 {
    let value = (i32::from(previous) * 4 + i32::from(current) + 4) / 5;
    // weighted mean of two i16 values plus a bias below 1 stays in range
    value as i16
}

/// Pointer state shared between the hook thread and pollers
#[derive(Debug, Default)]
pub struct MouseTracker {
    state: Mutex<MousePointerState>,
}

impl MouseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one motion or drag event
    pub fn record_motion(&self, position: Point) {
        self.state.lock().advance(position);
    }

    /// Copy of the current state
    pub fn state(&self) -> MousePointerState {
        *self.state.lock()
    }

    /// Back to the origin
    pub fn reset(&self) {
        *self.state.lock() = MousePointerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothing_from_origin() {
        let mut state = MousePointerState::default();
        state.advance(Point::new(10, 10));
        assert_eq!(state.previous, Point::new(0, 0));
        assert_eq!(state.current, Point::new(10, 10));
        assert_eq!(state.smoothed, Point::new(2, 2));
    }

    #[test]
    fn test_smoothing_weights_previous() {
        let mut state = MousePointerState::default();
        state.advance(Point::new(100, 50));
        state.advance(Point::new(110, 40));
        // (100*4 + 110 + 4) / 5 = 102, (50*4 + 40 + 4) / 5 = 48
        assert_eq!(state.smoothed, Point::new(102, 48));
        assert_eq!(state.previous, Point::new(100, 50));
    }

    #[test]
    fn test_smoothing_truncates_negative() {
        let mut state = MousePointerState::default();
        state.advance(Point::new(-10, -1));
        // (-10 + 4) / 5 = -1, (-1 + 4) / 5 = 0
        assert_eq!(state.smoothed, Point::new(-1, 0));
    }

    #[test]
    fn test_smoothing_at_extremes() {
        let mut state = MousePointerState::default();
        state.advance(Point::new(i16::MAX, i16::MIN));
        state.advance(Point::new(i16::MAX, i16::MIN));
        assert_eq!(state.smoothed, Point::new(i16::MAX, i16::MIN + 1));
    }

    #[test]
    fn test_tracker_reset() {
        let tracker = MouseTracker::new();
        tracker.record_motion(Point::new(5, 5));
        assert_eq!(tracker.state().current, Point::new(5, 5));
        tracker.reset();
        assert_eq!(tracker.state(), MousePointerState::default());
    }
}
