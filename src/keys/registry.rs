//! Fixed-capacity registry of currently pressed key codes
//!
//! Written by the hook thread, read by whoever polls once per frame. Slots
//! are atomics so a reader never sees a half-written code.

use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

use super::codes::VirtualKeyCode;

/// Upper bound on simultaneously tracked presses
pub const MAX_SIMULTANEOUS_KEYS: usize = 14;

const EMPTY: u16 = VirtualKeyCode::UNDEFINED.0;

/// Set of pressed codes with a hard capacity ceiling
///
/// Presses beyond [`MAX_SIMULTANEOUS_KEYS`] are dropped silently.
#[derive(Debug)]
pub struct KeyStateRegistry {
    slots: [AtomicU16; MAX_SIMULTANEOUS_KEYS],
    occupied: AtomicUsize,
}

impl KeyStateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU16::new(EMPTY)),
            occupied: AtomicUsize::new(0),
        }
    }

    /// True if `code` occupies a slot
    pub fn exists(&self, code: VirtualKeyCode) -> bool {
        if self.is_empty() || code.is_undefined() {
            return false;
        }
        self.slots
            .iter()
            .any(|slot| slot.load(Ordering::Acquire) == code.0)
    }

    /// Record a press; no-op if already present or the registry is full
    pub fn add(&self, code: VirtualKeyCode) {
        if code.is_undefined() || self.exists(code) {
            return;
        }
        for slot in &self.slots {
            if slot
                .compare_exchange(EMPTY, code.0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.occupied.fetch_add(1, Ordering::Release);
                return;
            }
        }
    }

    /// Forget a press; no-op if absent
    pub fn remove(&self, code: VirtualKeyCode) {
        if !self.exists(code) {
            return;
        }
        for slot in &self.slots {
            if slot
                .compare_exchange(code.0, EMPTY, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.occupied.fetch_sub(1, Ordering::Release);
                return;
            }
        }
    }

    /// Empty every slot
    pub fn clear(&self) {
        for slot in &self.slots {
            if slot.swap(EMPTY, Ordering::AcqRel) != EMPTY {
                self.occupied.fetch_sub(1, Ordering::Release);
            }
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.occupied.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        MAX_SIMULTANEOUS_KEYS
    }

    /// Codes currently pressed, in slot order
    pub fn pressed(&self) -> Vec<VirtualKeyCode> {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|&raw| raw != EMPTY)
            .map(VirtualKeyCode)
            .collect()
    }
}

impl Default for KeyStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    fn code(raw: u16) -> VirtualKeyCode {
        VirtualKeyCode(raw)
    }

    #[test]
    fn test_empty_registry() {
        let registry = KeyStateRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.exists(code(0x1E)));
        assert_eq!(registry.capacity(), MAX_SIMULTANEOUS_KEYS);
    }

    #[test]
    fn test_add_then_remove() {
        let registry = KeyStateRegistry::new();
        registry.add(code(0x1E));
        registry.add(code(0x1F));
        assert!(registry.exists(code(0x1E)));
        assert!(registry.exists(code(0x1F)));
        assert_eq!(registry.len(), 2);

        registry.remove(code(0x1E));
        assert!(!registry.exists(code(0x1E)));
        assert!(registry.exists(code(0x1F)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = KeyStateRegistry::new();
        registry.add(code(0x39));
        registry.add(code(0x39));
        assert!(registry.exists(code(0x39)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pressed(), vec![code(0x39)]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = KeyStateRegistry::new();
        registry.add(code(0x10));
        registry.remove(code(0x11));
        assert_eq!(registry.pressed(), vec![code(0x10)]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_overflow_is_dropped() {
        let registry = KeyStateRegistry::new();
        for raw in 1..=(MAX_SIMULTANEOUS_KEYS as u16 + 4) {
            registry.add(code(raw));
        }
        assert_eq!(registry.len(), MAX_SIMULTANEOUS_KEYS);
        assert!(registry.exists(code(MAX_SIMULTANEOUS_KEYS as u16)));
        assert!(!registry.exists(code(MAX_SIMULTANEOUS_KEYS as u16 + 1)));

        // a freed slot is reused by the next press
        registry.remove(code(3));
        registry.add(code(0x99));
        assert!(registry.exists(code(0x99)));
        assert_eq!(registry.len(), MAX_SIMULTANEOUS_KEYS);
    }

    #[test]
    fn test_undefined_is_never_stored() {
        let registry = KeyStateRegistry::new();
        registry.add(VirtualKeyCode::UNDEFINED);
        assert!(registry.is_empty());
        assert!(!registry.exists(VirtualKeyCode::UNDEFINED));
    }

    #[test]
    fn test_clear() {
        let registry = KeyStateRegistry::new();
        registry.add(code(1));
        registry.add(code(2));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.pressed().is_empty());
        assert!(!registry.exists(code(1)));
    }

    #[test]
    fn test_sequence_matches_model_set() {
        // deterministic pseudo-random add/remove sequence checked against a HashSet
        let registry = KeyStateRegistry::new();
        let mut model: HashSet<u16> = HashSet::new();
        let mut seed: u32 = 0x2545_F491;

        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let raw = (seed % 24) as u16 + 1;
            if seed & 0x100 == 0 {
                registry.add(code(raw));
                if model.len() < MAX_SIMULTANEOUS_KEYS {
                    model.insert(raw);
                }
            } else {
                registry.remove(code(raw));
                model.remove(&raw);
            }

            assert!(registry.len() <= MAX_SIMULTANEOUS_KEYS);
            assert_eq!(registry.len(), model.len());
            for raw in 1..=24u16 {
                assert_eq!(registry.exists(code(raw)), model.contains(&raw));
            }
        }
    }

    #[test]
    fn test_concurrent_polling_sees_no_torn_codes() {
        let registry = Arc::new(KeyStateRegistry::new());
        let valid: HashSet<u16> = [0x001E, 0x0E1D, 0xE048, 0xED01, 0xED03, 0xED11]
            .into_iter()
            .collect();
        // byte-wise mixes of two written codes that were never written whole
        let torn: Vec<u16> = valid
            .iter()
            .flat_map(|&hi| valid.iter().map(move |&lo| (hi & 0xFF00) | (lo & 0x00FF)))
            .filter(|raw| !valid.contains(raw))
            .collect();
        assert!(!torn.is_empty());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let registry = Arc::clone(&registry);
            let codes: Vec<u16> = valid.iter().copied().collect();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for round in 0..20_000usize {
                    let raw = codes[round % codes.len()];
                    registry.add(code(raw));
                    if round % 3 == 0 {
                        registry.remove(code(codes[(round / 3) % codes.len()]));
                    }
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        while !done.load(Ordering::SeqCst) {
            for pressed in registry.pressed() {
                assert!(valid.contains(&pressed.0), "torn read {pressed}");
            }
            for &raw in &torn {
                assert!(!registry.exists(code(raw)), "torn match {raw:#06X}");
            }
            assert!(registry.len() <= MAX_SIMULTANEOUS_KEYS);
        }

        writer.join().unwrap();
    }
}
