use serde::{Deserialize, Serialize};
use std::fmt;

/// Matrix position of a physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPos {
    pub row: u8,
    pub col: u8,
}

impl KeyPos {
    /// Sentinel for "no key".
    pub const NONE: KeyPos = KeyPos::new(0xFF, 0xFF);

    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    pub const fn is_none(self) -> bool {
        self.row == 0xFF && self.col == 0xFF
    }
}

impl Default for KeyPos {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for KeyPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Tap bookkeeping carried by a record. `count == 0` means hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TapState {
    pub interrupted: bool,
    pub count: u8,
}

/// Origin of an event as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventKind {
    /// Regular matrix scan event.
    #[default]
    Key,
    /// Synthesized by the host's combo feature; never intercepted.
    Combo,
}

/// A single press or release as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub pos: KeyPos,
    pub pressed: bool,
    /// Wrapping 16-bit millisecond timestamp.
    pub time: u16,
    pub tap: TapState,
    pub keycode: u16,
    pub kind: EventKind,
}

impl KeyRecord {
    pub const EMPTY: KeyRecord = KeyRecord {
        pos: KeyPos::NONE,
        pressed: false,
        time: 0,
        tap: TapState {
            interrupted: false,
            count: 0,
        },
        keycode: 0,
        kind: EventKind::Key,
    };

    pub const fn press(pos: KeyPos, keycode: u16, time: u16) -> Self {
        Self {
            pos,
            pressed: true,
            time,
            tap: TapState {
                interrupted: false,
                count: 0,
            },
            keycode,
            kind: EventKind::Key,
        }
    }

    pub const fn release(pos: KeyPos, keycode: u16, time: u16) -> Self {
        Self {
            pressed: false,
            ..Self::press(pos, keycode, time)
        }
    }

    pub fn set_tap(&mut self) {
        self.tap.interrupted = true;
        self.tap.count = 1;
    }

    pub fn set_hold(&mut self) {
        self.tap.count = 0;
    }

    pub const fn is_tap(&self) -> bool {
        self.tap.count > 0
    }
}

impl Default for KeyRecord {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// What the host should do with the event it handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Continue normal processing of the original record.
    Pass,
    /// The engine consumed the event.
    Block,
}

/// Engine status. Ordering matters: every status at or above `DecidedTap`
/// is a committed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Idle,
    Pressed,
    SecondPressed,
    DecidedTap,
    DecidedHold,
}

impl Status {
    pub const fn is_decided(self) -> bool {
        matches!(self, Status::DecidedTap | Status::DecidedHold)
    }

    pub const fn is_undecided(self) -> bool {
        matches!(self, Status::Pressed | Status::SecondPressed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "IDLE",
            Status::Pressed => "PRESSED",
            Status::SecondPressed => "SECOND_PRESSED",
            Status::DecidedTap => "DECIDED_TAP",
            Status::DecidedHold => "DECIDED_HOLD",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
