//! Layer-scoped alt-tab: while a nominated layer is on, `LALT(KC_TAB)` and
//! `LSA(KC_TAB)` keep left Alt registered between presses so the window
//! switcher stays open. Any other key (left click excepted) or leaving the
//! layer releases Alt.

use crate::host::Host;
use crate::keycodes::{lalt, lsa, lsft, KC_BTN1, KC_LALT, KC_TAB};
use crate::types::{KeyAction, KeyRecord};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AltTab {
    layer: u8,
    running: bool,
}

impl AltTab {
    pub fn new(layer: u8) -> Self {
        Self { layer, running: false }
    }

    pub fn layer(&self) -> u8 {
        self.layer
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn stop<H: Host>(&mut self, host: &mut H) {
        host.unregister_code(KC_LALT);
        self.running = false;
        debug!("alt-tab released");
    }

    pub fn process_record<H: Host>(&mut self, host: &mut H, keycode: u16, record: &KeyRecord) -> KeyAction {
        let is_alt_tab_key = keycode == lalt(KC_TAB) || keycode == lsa(KC_TAB);
        if !is_alt_tab_key || !host.is_layer_on(self.layer) {
            if self.running && keycode != KC_BTN1 {
                self.stop(host);
            }
            return KeyAction::Pass;
        }

        if !self.running {
            host.register_code(KC_LALT);
            self.running = true;
            debug!("alt-tab started on layer {}", self.layer);
        }
        if record.pressed {
            if keycode == lalt(KC_TAB) {
                host.tap_code(KC_TAB);
            } else {
                host.tap_code(lsft(KC_TAB));
            }
        }
        KeyAction::Block
    }

    /// Releases Alt once the layer has been left.
    pub fn post_process_record<H: Host>(&mut self, host: &mut H) {
        if self.running && !host.is_layer_on(self.layer) {
            self.stop(host);
        }
    }
}
