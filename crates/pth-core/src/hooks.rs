//! Overridable decision points of the engine.
//!
//! Every field is a plain function pointer receiving the engine, so a hook
//! can read any accessor (and the host) while deciding. The `default_*`
//! functions are public so custom hooks can fall back to them.

use crate::engine::Engine;
use crate::host::Host;
use crate::keycodes::{self, KC_NO, MOD_LCTL, MOD_LSFT, MOD_MASK_GUI};
use crate::predictor::{self, FAST_STREAK_TAP_THRESHOLD_MS};
use crate::side::SideByte;
use crate::types::{KeyRecord, Status};

pub type KeyPredicate<H> = fn(&Engine<H>, u16, &KeyRecord) -> bool;
pub type EnginePredicate<H> = fn(&Engine<H>) -> bool;

pub struct Hooks<H: Host> {
    pub side_of: fn(&Engine<H>, &KeyRecord) -> SideByte,
    pub should_hold_instantly: KeyPredicate<H>,
    pub second_should_hold_instantly: KeyPredicate<H>,
    pub should_choose_tap_when_second_is_same_side_press: EnginePredicate<H>,
    pub should_choose_tap_when_second_is_same_side_release: EnginePredicate<H>,
    /// Milliseconds after the PTH press at which `forced_choice_after_timeout`
    /// runs. Zero runs it immediately on press.
    pub timeout_for_forcing_choice: fn(&Engine<H>) -> u16,
    /// Anything but `DecidedTap` or `DecidedHold` leaves the PTH undecided.
    pub forced_choice_after_timeout: fn(&Engine<H>) -> Status,
    /// Receives the 5-bit mods of an instantly held mod-tap being rolled back.
    pub should_neutralize_mods: fn(&Engine<H>, u8) -> bool,
    /// Non-`KC_NO` replaces the hold of the PTH (and disables instant hold).
    pub code_to_be_registered_instead_when_hold_chosen: fn(&Engine<H>) -> u16,
    pub should_register_as_hold_when_same_side: KeyPredicate<H>,
    pub is_fast_streak_tap_key: fn(&Engine<H>, u16) -> bool,
    pub prediction_factor_for_hold: fn(&Engine<H>) -> f32,
    pub predict_fast_streak_tap: EnginePredicate<H>,
    pub predict_min_overlap_for_hold_ms: fn(&Engine<H>) -> u16,
    pub predict_hold_when_third_press: EnginePredicate<H>,
    pub predict_hold_when_pth_release_after_second_press: EnginePredicate<H>,
    pub predict_hold_when_pth_release_after_second_release: EnginePredicate<H>,
}

// Derives would require `H: Clone`.
impl<H: Host> Clone for Hooks<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: Host> Copy for Hooks<H> {}

impl<H: Host> Default for Hooks<H> {
    fn default() -> Self {
        Self {
            side_of: default_side_of,
            should_hold_instantly: default_should_hold_instantly,
            second_should_hold_instantly: default_second_should_hold_instantly,
            should_choose_tap_when_second_is_same_side_press: default_should_choose_tap_when_second_is_same_side_press,
            should_choose_tap_when_second_is_same_side_release: default_should_choose_tap_when_second_is_same_side_release,
            timeout_for_forcing_choice: default_timeout_for_forcing_choice,
            forced_choice_after_timeout: default_forced_choice_after_timeout,
            should_neutralize_mods: default_should_neutralize_mods,
            code_to_be_registered_instead_when_hold_chosen: default_code_to_be_registered_instead_when_hold_chosen,
            should_register_as_hold_when_same_side: default_should_register_as_hold_when_same_side,
            is_fast_streak_tap_key: default_is_fast_streak_tap_key,
            prediction_factor_for_hold: default_prediction_factor_for_hold,
            predict_fast_streak_tap: default_predict_fast_streak_tap,
            predict_min_overlap_for_hold_ms: default_predict_min_overlap_for_hold_ms,
            predict_hold_when_third_press: default_predict_hold_when_third_press,
            predict_hold_when_pth_release_after_second_press: default_predict_hold_when_pth_release_after_second_press,
            predict_hold_when_pth_release_after_second_release: default_predict_hold_when_pth_release_after_second_release,
        }
    }
}

impl<H: Host> std::fmt::Debug for Hooks<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

pub fn default_side_of<H: Host>(engine: &Engine<H>, record: &KeyRecord) -> SideByte {
    engine.host().side_at(record.pos)
}

/// No instant hold while caps word is on, nor for a mod-tap whose mods are
/// already active or include GUI.
pub fn default_should_hold_instantly<H: Host>(engine: &Engine<H>, keycode: u16, _record: &KeyRecord) -> bool {
    let host = engine.host();
    if host.is_caps_word_on() {
        return false;
    }
    !keycodes::is_mod_tap_with_any_mods_of(keycode, host.mods() | MOD_MASK_GUI)
}

pub fn default_second_should_hold_instantly<H: Host>(engine: &Engine<H>, keycode: u16, record: &KeyRecord) -> bool {
    (engine.hooks().should_hold_instantly)(engine, keycode, record)
}

/// A same-side plain key pressed during a PTH is a roll.
pub fn default_should_choose_tap_when_second_is_same_side_press<H: Host>(engine: &Engine<H>) -> bool {
    !engine.is_second_tap_hold()
}

pub fn default_should_choose_tap_when_second_is_same_side_release<H: Host>(_engine: &Engine<H>) -> bool {
    true
}

pub fn default_timeout_for_forcing_choice<H: Host>(_engine: &Engine<H>) -> u16 {
    700
}

pub fn default_forced_choice_after_timeout<H: Host>(engine: &Engine<H>) -> Status {
    if engine.has_second() {
        Status::Idle
    } else {
        Status::DecidedHold
    }
}

/// Ctrl and Shift are harmless on their own; everything else is neutralized.
pub fn default_should_neutralize_mods<H: Host>(_engine: &Engine<H>, mods5: u8) -> bool {
    mods5 & (MOD_LCTL | MOD_LSFT) == 0
}

pub fn default_code_to_be_registered_instead_when_hold_chosen<H: Host>(_engine: &Engine<H>) -> u16 {
    KC_NO
}

pub fn default_should_register_as_hold_when_same_side<H: Host>(
    _engine: &Engine<H>,
    _keycode: u16,
    _record: &KeyRecord,
) -> bool {
    true
}

/// Letters and prose punctuation, unless Ctrl, GUI or left Alt is held.
/// One-shot modifiers do not count.
pub fn default_is_fast_streak_tap_key<H: Host>(engine: &Engine<H>, keycode: u16) -> bool {
    predictor::is_fast_streak_tap_key(keycode, engine.host().real_mods())
}

pub fn default_prediction_factor_for_hold<H: Host>(engine: &Engine<H>) -> f32 {
    predictor::prediction_factor_for_user_value(engine.pth_side_user_bits() >> 4)
}

pub fn default_predict_fast_streak_tap<H: Host>(engine: &Engine<H>) -> bool {
    let is_streak_key = engine.hooks().is_fast_streak_tap_key;
    is_streak_key(engine, engine.pth_keycode())
        && is_streak_key(engine, engine.prev_press_keycode())
        && engine.prev_status() != Status::DecidedHold
        && engine.prev_press_to_pth_press_dur() < FAST_STREAK_TAP_THRESHOLD_MS
}

/// Unclamped; the engine clamps into the configured overlap range.
pub fn default_predict_min_overlap_for_hold_ms<H: Host>(engine: &Engine<H>) -> u16 {
    let factor = (engine.hooks().prediction_factor_for_hold)(engine);
    predictor::min_overlap_for_hold_ms(&engine.prediction_inputs(), factor, engine.is_second_same_side_as_pth())
}

fn scaled<H: Host>(engine: &Engine<H>, probability: f32) -> bool {
    predictor::is_hold(probability, (engine.hooks().prediction_factor_for_hold)(engine))
}

pub fn default_predict_hold_when_third_press<H: Host>(engine: &Engine<H>) -> bool {
    scaled(engine, predictor::hold_probability_when_third_press(&engine.prediction_inputs()))
}

pub fn default_predict_hold_when_pth_release_after_second_press<H: Host>(engine: &Engine<H>) -> bool {
    scaled(
        engine,
        predictor::hold_probability_when_pth_release_after_second_press(&engine.prediction_inputs()),
    )
}

pub fn default_predict_hold_when_pth_release_after_second_release<H: Host>(engine: &Engine<H>) -> bool {
    scaled(
        engine,
        predictor::hold_probability_when_pth_release_after_second_release(&engine.prediction_inputs()),
    )
}
