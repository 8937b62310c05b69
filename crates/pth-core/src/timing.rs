//! Saturating 16-bit timers and the rolling press/overlap history that feeds
//! the predictor.
//!
//! The firmware clock is a wrapping `u16` in milliseconds. Durations are
//! measured with wrapping subtraction and capped at [`MAX_DUR`]; a timer that
//! has been running for at least that long is flagged `max_reached` by
//! housekeeping so that a later wrap cannot make it look recent again.

use tracing::trace;

/// Upper bound of every tracked duration. Must stay below `i16::MAX`.
pub const MAX_DUR: u16 = 4096;

/// Weights of the two-sample exponential average (`e^0` and `e^1` normalised).
#[allow(clippy::excessive_precision)]
pub const W_AVG_OLDER: f32 = 0.2689414213699951;
#[allow(clippy::excessive_precision)]
pub const W_AVG_NEWER: f32 = 0.7310585786300049;

/// Two-sample weighted average. A negative `older` means "no data" and
/// yields `newer` unchanged.
pub fn weighted_avg(older: f32, newer: f32) -> f32 {
    if older < 0.0 {
        return newer;
    }
    W_AVG_OLDER * older + W_AVG_NEWER * newer
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    start: u16,
    max_reached: bool,
}

impl Timer {
    pub const fn started_at(now: u16) -> Self {
        Self {
            start: now,
            max_reached: false,
        }
    }

    pub fn restart(&mut self, now: u16) {
        self.start = now;
        self.max_reached = false;
    }

    pub const fn start(&self) -> u16 {
        self.start
    }

    pub const fn max_reached(&self) -> bool {
        self.max_reached
    }

    /// Wrapping difference without saturation.
    pub const fn raw_elapsed(&self, now: u16) -> u16 {
        now.wrapping_sub(self.start)
    }

    pub fn elapsed(&self, now: u16) -> u16 {
        if self.max_reached {
            MAX_DUR
        } else {
            self.raw_elapsed(now).min(MAX_DUR)
        }
    }

    /// Flags the timer once it has run for `MAX_DUR`. Returns true on the
    /// transition.
    pub fn saturate_if_due(&mut self, now: u16) -> bool {
        if !self.max_reached && self.raw_elapsed(now) >= MAX_DUR {
            self.max_reached = true;
            return true;
        }
        false
    }
}

/// History captured the moment a tap-hold key becomes the PTH.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PthSnapshot {
    pub prev_prev_press_to_prev_press_dur: i16,
    pub prev_press_to_pth_press_dur: i16,
    pub prev_prev_overlap_dur: i16,
    pub prev_overlap_dur: i16,
    pub press_to_press_w_avg: f32,
    pub overlap_w_avg: f32,
    pub key_release_before_pth_to_pth_press_dur: u16,
}

impl Default for PthSnapshot {
    fn default() -> Self {
        Self {
            prev_prev_press_to_prev_press_dur: -1,
            prev_press_to_pth_press_dur: -1,
            prev_prev_overlap_dur: -1,
            prev_overlap_dur: -1,
            press_to_press_w_avg: 0.0,
            overlap_w_avg: 0.0,
            key_release_before_pth_to_pth_press_dur: 0,
        }
    }
}

/// Rolling record of every observed press and release. Never reset between
/// PTH lifecycles.
#[derive(Debug, Clone)]
pub struct TimingLedger {
    down_count: u8,
    overlap: Timer,
    press_to_press: Timer,
    release: Timer,
    prev_press_to_press_dur: i16,
    cur_press_to_press_dur: i16,
    prev_overlap_dur: i16,
    cur_overlap_dur: i16,
}

impl Default for TimingLedger {
    fn default() -> Self {
        Self {
            down_count: 0,
            overlap: Timer::default(),
            press_to_press: Timer::default(),
            release: Timer::default(),
            prev_press_to_press_dur: -1,
            cur_press_to_press_dur: -1,
            prev_overlap_dur: -1,
            cur_overlap_dur: -1,
        }
    }
}

impl TimingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the press-to-press timer `MAX_DUR` and the release timer
    /// `MAX_DUR - 100` in the past, as no history exists yet.
    pub fn seed(&mut self, now: u16) {
        self.press_to_press.restart(now.wrapping_sub(MAX_DUR));
        self.release.restart(now.wrapping_sub(MAX_DUR - 100));
    }

    pub const fn down_count(&self) -> u8 {
        self.down_count
    }

    pub const fn prev_press_to_press_dur(&self) -> i16 {
        self.prev_press_to_press_dur
    }

    pub const fn cur_press_to_press_dur(&self) -> i16 {
        self.cur_press_to_press_dur
    }

    pub const fn prev_overlap_dur(&self) -> i16 {
        self.prev_overlap_dur
    }

    pub const fn cur_overlap_dur(&self) -> i16 {
        self.cur_overlap_dur
    }

    /// Records a scan-driven press or release.
    pub fn observe(&mut self, pressed: bool, now: u16) {
        if pressed {
            let p2p = self.press_to_press.elapsed(now);
            self.prev_press_to_press_dur = self.cur_press_to_press_dur;
            self.cur_press_to_press_dur = p2p as i16;
            trace!("press-to-press {} ms", p2p);

            self.press_to_press.restart(now);
            self.down_count = self.down_count.saturating_add(1);
            if self.down_count == 2 {
                self.overlap.restart(now);
            }
        } else {
            let overlap = if self.down_count >= 2 {
                self.overlap.elapsed(now)
            } else {
                0
            };
            self.down_count = self.down_count.saturating_sub(1);
            self.prev_overlap_dur = self.cur_overlap_dur;
            self.cur_overlap_dur = overlap as i16;
            trace!("overlap {} ms", overlap);

            // the same overlap must not be counted twice
            self.overlap.restart(now);
            self.release.restart(now);
        }
    }

    /// Captures the history for a PTH that was just pressed. Must run after
    /// [`observe`](Self::observe) has seen that press.
    pub fn snapshot_for_pth(&self, now: u16) -> PthSnapshot {
        let prev_prev_p2p = self.prev_press_to_press_dur;
        let prev_p2p = self.cur_press_to_press_dur;

        let mut prev_prev_overlap = self.prev_overlap_dur;
        let mut prev_overlap = self.cur_overlap_dur;
        let down_before = self.down_count.saturating_sub(1);
        if down_before == 1 {
            // one key still down: it overlaps with the PTH, but nothing has ended yet
            prev_prev_overlap = prev_overlap;
            prev_overlap = 0;
        } else if down_before >= 2 {
            prev_prev_overlap = 0;
            prev_overlap = self.overlap.elapsed(now) as i16;
        }

        PthSnapshot {
            prev_prev_press_to_prev_press_dur: prev_prev_p2p,
            prev_press_to_pth_press_dur: prev_p2p,
            prev_prev_overlap_dur: prev_prev_overlap,
            prev_overlap_dur: prev_overlap,
            press_to_press_w_avg: weighted_avg(prev_prev_p2p as f32, prev_p2p as f32),
            overlap_w_avg: weighted_avg(prev_prev_overlap as f32, prev_overlap as f32),
            key_release_before_pth_to_pth_press_dur: self.release.elapsed(now),
        }
    }

    /// Saturates the ledger timers. The overlap timer only matters while two
    /// or more keys are down.
    pub fn tick(&mut self, now: u16) {
        self.release.saturate_if_due(now);
        if self.down_count >= 2 {
            self.overlap.saturate_if_due(now);
        }
        self.press_to_press.saturate_if_due(now);
    }
}
