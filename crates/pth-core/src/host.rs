use crate::side::SideByte;
use crate::types::{KeyPos, KeyRecord};

/// Everything the engine needs from the surrounding firmware.
///
/// The engine owns its host. Records handed to [`Host::process_record`] are
/// engine-driven: the host must run them through the rest of its pipeline
/// without calling back into the engine (or, if it does, the engine passes
/// them through because it is processing internally).
pub trait Host {
    /// Submits a synthesized press or release to everything after the engine.
    fn process_record(&mut self, record: &KeyRecord);

    fn register_code(&mut self, keycode: u16);

    fn unregister_code(&mut self, keycode: u16);

    fn tap_code(&mut self, keycode: u16) {
        self.register_code(keycode);
        self.send_report_and_wait();
        self.unregister_code(keycode);
    }

    /// Sends the pending HID report and waits the tap code delay, so that two
    /// reports close together are both seen by the OS.
    fn send_report_and_wait(&mut self);

    /// Wrapping millisecond clock.
    fn timer_read(&self) -> u16;

    fn side_at(&self, pos: KeyPos) -> SideByte;

    fn keycode_at(&self, layer: u8, pos: KeyPos) -> u16;

    /// Highest active layer that defines a key at `pos`.
    fn layer_for_position(&self, pos: KeyPos) -> u8;

    /// All active 8-bit modifiers, one-shot ones included.
    fn mods(&self) -> u8;

    /// Modifiers actually held, without one-shot ones. Hosts without one-shot
    /// modifiers can keep the default.
    fn real_mods(&self) -> u8 {
        self.mods()
    }

    fn is_caps_word_on(&self) -> bool {
        false
    }

    /// A non-zero per-key tapping term hands the key to the host's own
    /// tap-hold handling.
    fn tapping_term(&self, _keycode: u16, _record: &KeyRecord) -> u16 {
        0
    }

    fn is_layer_on(&self, _layer: u8) -> bool {
        false
    }
}
