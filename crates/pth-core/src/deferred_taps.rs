//! Positions of tap-hold keys that were pressed as tap while another key was
//! being decided. The next release at such a position must also be a tap.

use crate::types::KeyPos;
use tracing::warn;

pub const DEFERRED_TAP_SET_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct DeferredTapSet {
    positions: [KeyPos; DEFERRED_TAP_SET_SIZE],
    used: u8,
}

impl Default for DeferredTapSet {
    fn default() -> Self {
        Self {
            positions: [KeyPos::NONE; DEFERRED_TAP_SET_SIZE],
            used: 0,
        }
    }
}

impl DeferredTapSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn len(&self) -> usize {
        self.used.count_ones() as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Returns false if the set was full and `pos` was dropped.
    pub fn add(&mut self, pos: KeyPos) -> bool {
        let free = !self.used;
        if free == 0 {
            warn!("deferred tap set full, {} will release as hold", pos);
            return false;
        }
        let slot = free.trailing_zeros() as usize;
        self.positions[slot] = pos;
        self.used |= 1 << slot;
        true
    }

    fn slot_of(&self, pos: KeyPos) -> Option<usize> {
        let mut to_check = self.used;
        while to_check != 0 {
            let slot = to_check.trailing_zeros() as usize;
            if self.positions[slot] == pos {
                return Some(slot);
            }
            to_check &= !(1 << slot);
        }
        None
    }

    pub fn contains(&self, pos: KeyPos) -> bool {
        self.slot_of(pos).is_some()
    }

    /// Removes one entry for `pos`. Returns whether it was present.
    pub fn take(&mut self, pos: KeyPos) -> bool {
        match self.slot_of(pos) {
            Some(slot) => {
                self.used &= !(1 << slot);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_once() {
        let mut set = DeferredTapSet::new();
        let pos = KeyPos::new(2, 3);
        assert!(set.add(pos));
        assert!(set.contains(pos));
        assert!(set.take(pos));
        assert!(!set.take(pos));
        assert!(set.is_empty());
    }

    #[test]
    fn test_full_set_drops() {
        let mut set = DeferredTapSet::new();
        for col in 0..DEFERRED_TAP_SET_SIZE as u8 {
            assert!(set.add(KeyPos::new(0, col)));
        }
        assert!(!set.add(KeyPos::new(1, 0)));
        assert!(!set.contains(KeyPos::new(1, 0)));
        assert_eq!(set.len(), DEFERRED_TAP_SET_SIZE);
        assert!(set.take(KeyPos::new(0, 4)));
        assert!(set.add(KeyPos::new(1, 0)));
    }

    #[test]
    fn test_duplicates_are_taken_separately() {
        let mut set = DeferredTapSet::new();
        let pos = KeyPos::new(0, 0);
        set.add(pos);
        set.add(pos);
        assert!(set.take(pos));
        assert!(set.take(pos));
        assert!(!set.take(pos));
    }
}
