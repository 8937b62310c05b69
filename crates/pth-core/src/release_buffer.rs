//! Fixed-capacity store for releases that arrive while the PTH is undecided.
//!
//! Releases are held back so that, once the decision is made, the host sees
//! the PTH (as tap or hold) before them. Each record is tagged with whether
//! it happened before or after the second key was pressed; the two groups
//! are flushed at different points of a commit.

use crate::types::{KeyPos, KeyRecord};

pub const RELEASE_BUFFER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTime {
    BeforeSecond,
    AfterSecond,
}

#[derive(Debug, Clone)]
pub struct ReleaseBuffer {
    records: [KeyRecord; RELEASE_BUFFER_SIZE],
    used: u8,
    before_second: u8,
}

impl Default for ReleaseBuffer {
    fn default() -> Self {
        Self {
            records: [KeyRecord::EMPTY; RELEASE_BUFFER_SIZE],
            used: 0,
            before_second: 0,
        }
    }
}

impl ReleaseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn len(&self) -> usize {
        self.used.count_ones() as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub const fn is_full(&self) -> bool {
        self.used == u8::MAX
    }

    /// Stores `record` in the lowest free slot. Hands the record back when
    /// the buffer is full.
    pub fn cache(&mut self, record: KeyRecord, when: ReleaseTime) -> Result<(), KeyRecord> {
        let free = !self.used;
        if free == 0 {
            return Err(record);
        }
        let slot = free.trailing_zeros() as usize;
        self.records[slot] = record;
        let bit = 1u8 << slot;
        self.used |= bit;
        match when {
            ReleaseTime::BeforeSecond => self.before_second |= bit,
            ReleaseTime::AfterSecond => self.before_second &= !bit,
        }
        Ok(())
    }

    fn mask_for(&self, when: ReleaseTime) -> u8 {
        let matching = match when {
            ReleaseTime::BeforeSecond => self.before_second,
            ReleaseTime::AfterSecond => !self.before_second,
        };
        self.used & matching
    }

    /// Whether a release of `pos` is waiting in either group.
    pub fn contains(&self, pos: KeyPos) -> bool {
        self.records
            .iter()
            .enumerate()
            .any(|(slot, record)| self.used & (1 << slot) != 0 && record.pos == pos)
    }

    pub fn count(&self, when: ReleaseTime) -> usize {
        self.mask_for(when).count_ones() as usize
    }

    /// Removes every record of the given group and returns them in slot
    /// order. Slots are only freed by draining, and a group is never cached
    /// again before it is drained, so slot order is insertion order.
    pub fn drain(&mut self, when: ReleaseTime) -> Drained {
        let mask = self.mask_for(when);
        self.used &= !mask;
        Drained {
            records: self.records,
            remaining: mask,
        }
    }
}

/// Records removed by [`ReleaseBuffer::drain`]. Owns a copy of the slots so
/// the buffer can be mutated while replaying.
#[derive(Debug, Clone)]
pub struct Drained {
    records: [KeyRecord; RELEASE_BUFFER_SIZE],
    remaining: u8,
}

impl Iterator for Drained {
    type Item = KeyRecord;

    fn next(&mut self) -> Option<KeyRecord> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.remaining.trailing_zeros() as usize;
        self.remaining &= !(1u8 << slot);
        Some(self.records[slot])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Drained {}
