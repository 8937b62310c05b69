//! Simulated firmware around the engine: resolves records against the
//! keymap, keeps modifier and layer state, and logs every HID change.

use crate::trace::Keymap;
use pth_core::keycodes::{self, KC_NO, KC_TRNS};
use pth_core::{AltTab, Host, KeyAction, KeyPos, KeyRecord, SideByte, SideLayout};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    Code(u16),
    Mods(u8),
    Layer(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidAction {
    pub t: u16,
    pub text: String,
}

#[derive(Debug)]
pub struct SimHost {
    now: u16,
    sides: SideLayout,
    keymap: Keymap,
    layers: u16,
    mods: u8,
    held: HashMap<KeyPos, Held>,
    alt_tab: Option<AltTab>,
    actions: Vec<HidAction>,
}

fn modifier_bit(keycode: u16) -> u8 {
    1 << (keycode - keycodes::KC_LCTL)
}

impl SimHost {
    pub fn new(sides: SideLayout, keymap: Keymap, alt_tab: Option<AltTab>) -> Self {
        Self {
            now: 0,
            sides,
            keymap,
            layers: 1,
            mods: 0,
            held: HashMap::new(),
            alt_tab,
            actions: Vec::new(),
        }
    }

    pub fn set_now(&mut self, now: u16) {
        self.now = now;
    }

    pub fn take_actions(&mut self) -> Vec<HidAction> {
        std::mem::take(&mut self.actions)
    }

    /// Keycode a fresh press at `pos` resolves to.
    pub fn resolve(&self, pos: KeyPos) -> u16 {
        self.keycode_at(self.layer_for_position(pos), pos)
    }

    fn log(&mut self, text: String) {
        trace!("hid {}", text);
        self.actions.push(HidAction { t: self.now, text });
    }

    /// Presses or releases a keycode, including the mods of a modded one.
    fn set_code(&mut self, keycode: u16, on: bool) {
        let edge = if on { "down" } else { "up" };
        let mods = if keycodes::is_modded(keycode) {
            keycodes::mods_5_to_8_bit(keycodes::modded_mods(keycode))
        } else {
            0
        };
        let base = if mods != 0 { keycode & 0xFF } else { keycode };

        if on {
            self.set_mods(mods, true);
        }
        if keycodes::is_modifier(base) {
            if on {
                self.mods |= modifier_bit(base);
            } else {
                self.mods &= !modifier_bit(base);
            }
        }
        if base != KC_NO {
            self.log(format!("{} {}", edge, keycodes::keycode_name(base)));
        }
        if !on {
            self.set_mods(mods, false);
        }
    }

    fn set_mods(&mut self, mods: u8, on: bool) {
        for kc in keycodes::modifier_keycodes(mods) {
            let edge = if on { "down" } else { "up" };
            self.log(format!("{} {}", edge, keycodes::keycode_name(kc)));
        }
        if on {
            self.mods |= mods;
        } else {
            self.mods &= !mods;
        }
    }

    fn apply(&mut self, held: Held, on: bool) {
        match held {
            Held::Code(kc) => self.set_code(kc, on),
            Held::Mods(mods) => self.set_mods(mods, on),
            Held::Layer(layer) => {
                if on {
                    self.layers |= 1 << layer;
                } else {
                    self.layers &= !(1 << layer);
                }
                self.log(format!("layer {} {}", layer, if on { "on" } else { "off" }));
            }
        }
    }

    fn action_for(record: &KeyRecord) -> Held {
        let kc = record.keycode;
        if keycodes::is_mod_tap(kc) && !record.is_tap() {
            Held::Mods(keycodes::mod_tap_mods_8_bit(kc))
        } else if keycodes::is_layer_tap(kc) && !record.is_tap() {
            Held::Layer(keycodes::layer_tap_layer(kc))
        } else if keycodes::is_tap_hold(kc) {
            Held::Code(keycodes::tap_keycode(kc))
        } else {
            Held::Code(kc)
        }
    }
}

impl Host for SimHost {
    fn process_record(&mut self, record: &KeyRecord) {
        if let Some(mut alt_tab) = self.alt_tab.take() {
            let action = alt_tab.process_record(self, record.keycode, record);
            self.alt_tab = Some(alt_tab);
            if action == KeyAction::Block {
                return;
            }
        }

        if record.pressed {
            let held = Self::action_for(record);
            self.apply(held, true);
            self.held.insert(record.pos, held);
        } else if let Some(held) = self.held.remove(&record.pos) {
            self.apply(held, false);
        }

        if let Some(mut alt_tab) = self.alt_tab.take() {
            alt_tab.post_process_record(self);
            self.alt_tab = Some(alt_tab);
        }
    }

    fn register_code(&mut self, keycode: u16) {
        self.set_code(keycode, true);
    }

    fn unregister_code(&mut self, keycode: u16) {
        self.set_code(keycode, false);
    }

    fn send_report_and_wait(&mut self) {
        self.log("gap".to_string());
    }

    fn timer_read(&self) -> u16 {
        self.now
    }

    fn side_at(&self, pos: KeyPos) -> SideByte {
        self.sides.get(pos).unwrap_or(SideByte::L)
    }

    fn keycode_at(&self, layer: u8, pos: KeyPos) -> u16 {
        self.keymap.get(layer, pos)
    }

    fn layer_for_position(&self, pos: KeyPos) -> u8 {
        (0..self.keymap.layer_count().min(16) as u8)
            .rev()
            .find(|&layer| self.is_layer_on(layer) && self.keymap.get(layer, pos) != KC_TRNS)
            .unwrap_or(0)
    }

    fn mods(&self) -> u8 {
        self.mods
    }

    fn is_layer_on(&self, layer: u8) -> bool {
        layer < 16 && self.layers & (1 << layer) != 0
    }
}
