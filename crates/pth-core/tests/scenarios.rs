use pth_core::engine::Engine;
use pth_core::hooks::Hooks;
use pth_core::keycodes::*;
use pth_core::{Host, KeyAction, KeyPos, KeyRecord, Settings, SideByte, Status};
use std::collections::HashMap;

const COLS: usize = 10;

#[derive(Debug, Clone, Copy)]
enum Held {
    Key(u16),
    Mods(u8),
    Layer(u8),
}

/// Firmware stand-in: resolves records the way the keymap would and logs
/// every HID-level change.
#[derive(Debug)]
struct RecordingHost {
    now: u16,
    keymap: Vec<[u16; COLS]>,
    layers: u16,
    mods: u8,
    held: HashMap<KeyPos, Held>,
    out: Vec<String>,
}

impl RecordingHost {
    fn new() -> Self {
        let mut base = [KC_NO; COLS];
        base[1] = mt(MOD_LCTL, KC_A);
        base[2] = KC_M;
        base[3] = mt(MOD_LALT, KC_A);
        base[4] = lt(1, KC_ENT);
        base[6] = KC_K;
        base[7] = KC_S;
        base[8] = lt(1, KC_SPC);
        base[9] = KC_L;
        let mut nav = [KC_TRNS; COLS];
        nav[2] = KC_LEFT;
        nav[9] = KC_NO;
        Self {
            now: 0,
            keymap: vec![base, nav],
            layers: 1,
            mods: 0,
            held: HashMap::new(),
            out: Vec::new(),
        }
    }

    fn apply(&mut self, held: Held, on: bool) {
        let edge = if on { "down" } else { "up" };
        match held {
            Held::Key(kc) => self.out.push(format!("{} {}", edge, keycode_name(kc))),
            Held::Mods(mods) => {
                for kc in modifier_keycodes(mods) {
                    self.out.push(format!("{} {}", edge, keycode_name(kc)));
                }
                if on {
                    self.mods |= mods;
                } else {
                    self.mods &= !mods;
                }
            }
            Held::Layer(layer) => {
                self.out.push(format!("layer {} {}", layer, if on { "on" } else { "off" }));
                if on {
                    self.layers |= 1 << layer;
                } else {
                    self.layers &= !(1 << layer);
                }
            }
        }
    }
}

impl Host for RecordingHost {
    fn process_record(&mut self, record: &KeyRecord) {
        if !record.pressed {
            if let Some(held) = self.held.remove(&record.pos) {
                self.apply(held, false);
            }
            return;
        }
        let kc = record.keycode;
        let held = if is_mod_tap(kc) && !record.is_tap() {
            Held::Mods(mod_tap_mods_8_bit(kc))
        } else if is_layer_tap(kc) && !record.is_tap() {
            Held::Layer(layer_tap_layer(kc))
        } else if is_tap_hold(kc) {
            Held::Key(tap_keycode(kc))
        } else {
            Held::Key(kc)
        };
        self.apply(held, true);
        self.held.insert(record.pos, held);
    }

    fn register_code(&mut self, keycode: u16) {
        self.out.push(format!("down {}", keycode_name(keycode)));
    }

    fn unregister_code(&mut self, keycode: u16) {
        self.out.push(format!("up {}", keycode_name(keycode)));
    }

    fn send_report_and_wait(&mut self) {
        self.out.push("gap".to_string());
    }

    fn timer_read(&self) -> u16 {
        self.now
    }

    fn side_at(&self, pos: KeyPos) -> SideByte {
        if (pos.col as usize) < COLS / 2 {
            SideByte::L
        } else {
            SideByte::R
        }
    }

    fn keycode_at(&self, layer: u8, pos: KeyPos) -> u16 {
        self.keymap
            .get(layer as usize)
            .map_or(KC_NO, |row| row[pos.col as usize])
    }

    fn layer_for_position(&self, pos: KeyPos) -> u8 {
        (0..self.keymap.len() as u8)
            .rev()
            .find(|&layer| self.layers & (1 << layer) != 0 && self.keycode_at(layer, pos) != KC_TRNS)
            .unwrap_or(0)
    }

    fn mods(&self) -> u8 {
        self.mods
    }

    fn is_layer_on(&self, layer: u8) -> bool {
        self.layers & (1 << layer) != 0
    }
}

struct Rig {
    engine: Engine<RecordingHost>,
    pressed_keycodes: HashMap<KeyPos, u16>,
    ticking: bool,
}

impl Rig {
    fn new(hooks: Hooks<RecordingHost>) -> Self {
        Self::with_settings(hooks, Settings::default())
    }

    fn with_settings(hooks: Hooks<RecordingHost>, settings: Settings) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
        let settings = Settings { debug: true, ..settings };
        let mut engine = Engine::new(RecordingHost::new(), settings).with_hooks(hooks);
        engine.post_init();
        Self {
            engine,
            pressed_keycodes: HashMap::new(),
            ticking: true,
        }
    }

    fn without_instant_hold() -> Self {
        Self::new(Hooks {
            should_hold_instantly: never_instant,
            ..Hooks::default()
        })
    }

    fn advance(&mut self, t: u16) {
        while self.engine.host().now < t {
            self.engine.host_mut().now += 1;
            if self.ticking {
                self.engine.housekeeping_tick();
            }
        }
    }

    fn event(&mut self, t: u16, col: u8, pressed: bool) -> KeyAction {
        self.advance(t);
        let pos = KeyPos::new(0, col);
        let keycode = if pressed {
            let host = self.engine.host();
            let kc = host.keycode_at(host.layer_for_position(pos), pos);
            self.pressed_keycodes.insert(pos, kc);
            kc
        } else {
            self.pressed_keycodes.remove(&pos).unwrap_or(KC_NO)
        };
        let record = if pressed {
            KeyRecord::press(pos, keycode, t)
        } else {
            KeyRecord::release(pos, keycode, t)
        };
        let action = self.engine.on_event(record);
        if action == KeyAction::Pass {
            self.engine.host_mut().process_record(&record);
        }
        action
    }

    fn press(&mut self, t: u16, col: u8) -> KeyAction {
        self.event(t, col, true)
    }

    fn release(&mut self, t: u16, col: u8) -> KeyAction {
        self.event(t, col, false)
    }

    fn out(&self) -> Vec<&str> {
        self.engine.host().out.iter().map(String::as_str).collect()
    }

    fn status(&self) -> Status {
        self.engine.status()
    }
}

fn never_instant(_: &Engine<RecordingHost>, _: u16, _: &KeyRecord) -> bool {
    false
}

fn always_tap(_: &Engine<RecordingHost>) -> bool {
    false
}

const L: u8 = 1;
const M: u8 = 2;
const ALT_L: u8 = 3;
const R: u8 = 6;
const S: u8 = 7;
const SPACE: u8 = 8;
const ENTER: u8 = 4;
/// `KC_L` on the base layer, nothing on layer 1.
const NAV_HOLE: u8 = 9;

#[test]
fn pure_tap() {
    let mut rig = Rig::without_instant_hold();
    assert_eq!(rig.press(0, L), KeyAction::Block);
    assert_eq!(rig.status(), Status::Pressed);
    assert_eq!(rig.release(60, L), KeyAction::Block);
    assert_eq!(rig.status(), Status::Idle);
    assert_eq!(rig.engine.prev_status(), Status::DecidedTap);
    assert_eq!(rig.out(), vec!["down KC_A", "gap", "up KC_A"]);
}

#[test]
fn clear_hold_commits_once_overlap_is_reached() {
    let mut rig = Rig::without_instant_hold();
    rig.press(0, L);
    rig.press(90, R);
    assert_eq!(rig.status(), Status::SecondPressed);
    // predicted 5 ms, raised to the 39 ms floor
    assert_eq!(rig.engine.min_overlap_for_hold(), 39);

    rig.advance(128);
    assert_eq!(rig.status(), Status::SecondPressed);
    rig.advance(129);
    assert_eq!(rig.status(), Status::DecidedHold);

    assert_eq!(rig.release(260, R), KeyAction::Pass);
    assert_eq!(rig.release(280, L), KeyAction::Block);
    assert_eq!(rig.status(), Status::Idle);
    assert_eq!(rig.out(), vec!["down KC_LCTL", "down KC_K", "gap", "up KC_K", "up KC_LCTL"]);
}

#[test]
fn same_side_roll_taps_in_press_order() {
    let mut rig = Rig::without_instant_hold();
    rig.press(0, L);
    assert_eq!(rig.press(40, M), KeyAction::Block);
    assert_eq!(rig.status(), Status::DecidedTap);
    rig.release(70, L);
    assert_eq!(rig.release(100, M), KeyAction::Pass);
    assert_eq!(rig.out(), vec!["down KC_A", "down KC_M", "gap", "up KC_A", "up KC_M"]);
}

#[test]
fn instant_hold_is_rolled_back_on_tap() {
    let mut rig = Rig::new(Hooks::default());
    rig.press(0, L);
    assert_eq!(rig.out(), vec!["down KC_LCTL"]);
    rig.release(55, L);
    assert_eq!(rig.out(), vec!["down KC_LCTL", "up KC_LCTL", "down KC_A", "gap", "up KC_A"]);
}

#[test]
fn instant_alt_is_neutralized_before_rollback() {
    let mut rig = Rig::new(Hooks::default());
    rig.press(0, ALT_L);
    rig.release(55, ALT_L);
    assert_eq!(
        rig.out(),
        vec![
            "down KC_LALT",
            "down KC_F23",
            "gap",
            "up KC_F23",
            "up KC_LALT",
            "down KC_A",
            "gap",
            "up KC_A",
        ]
    );
}

#[test]
fn third_press_predicts_hold_on_cold_start() {
    let mut rig = Rig::without_instant_hold();
    rig.ticking = false;
    rig.press(0, L);
    rig.press(80, R);
    assert_eq!(rig.press(140, S), KeyAction::Block);
    assert_eq!(rig.status(), Status::DecidedHold);
    assert_eq!(rig.engine.prediction_inputs().second_press_to_third_press_dur, 60);
    assert_eq!(rig.out(), vec!["down KC_LCTL", "down KC_K", "down KC_S"]);
}

#[test]
fn lone_pth_is_forced_to_hold() {
    let mut rig = Rig::without_instant_hold();
    rig.press(0, L);
    rig.advance(699);
    assert_eq!(rig.status(), Status::Pressed);
    assert!(rig.out().is_empty());
    rig.advance(700);
    assert_eq!(rig.status(), Status::DecidedHold);
    assert_eq!(rig.out(), vec!["down KC_LCTL"]);
    rig.release(1200, L);
    assert_eq!(rig.status(), Status::Idle);
    assert_eq!(rig.out(), vec!["down KC_LCTL", "up KC_LCTL"]);
}

#[test]
fn layer_tap_hold_resolves_second_on_target_layer() {
    let mut rig = Rig::without_instant_hold();
    rig.press(0, SPACE);
    rig.press(50, M);
    rig.advance(300);
    assert_eq!(rig.status(), Status::DecidedHold);
    assert_eq!(rig.engine.second_keycode(), KC_LEFT);
    rig.release(320, M);
    rig.release(400, SPACE);
    assert_eq!(rig.out(), vec!["layer 1 on", "down KC_LEFT", "gap", "up KC_LEFT", "layer 1 off"]);
}

#[test]
fn tap_hold_pressed_after_tap_decision_releases_as_tap() {
    let mut rig = Rig::new(Hooks {
        should_hold_instantly: never_instant,
        predict_hold_when_third_press: always_tap,
        ..Hooks::default()
    });
    rig.press(0, L);
    rig.press(20, R);
    rig.press(30, SPACE);
    assert_eq!(rig.status(), Status::DecidedTap);
    assert_eq!(rig.release(100, SPACE), KeyAction::Block);
    rig.release(110, R);
    rig.release(120, L);
    assert_eq!(
        rig.out(),
        vec![
            "down KC_A",
            "down KC_K",
            "down KC_SPC",
            "up KC_SPC",
            "gap",
            "up KC_K",
            "gap",
            "up KC_A",
        ]
    );
}

#[test]
fn release_before_second_follows_the_tap() {
    let mut rig = Rig::without_instant_hold();
    assert_eq!(rig.press(0, S), KeyAction::Pass);
    rig.press(30, L);
    assert_eq!(rig.release(50, S), KeyAction::Block);
    rig.release(90, L);
    assert_eq!(rig.out(), vec!["down KC_S", "down KC_A", "gap", "up KC_S", "gap", "up KC_A"]);
}

#[test]
fn instant_second_waits_for_its_own_held_back_release() {
    let mut rig = Rig::new(Hooks::default());
    rig.press(0, L);
    rig.press(10, M);
    assert_eq!(rig.status(), Status::DecidedTap);
    // tapped while the first PTH is decided
    rig.press(20, ENTER);
    rig.release(30, L);
    rig.release(40, M);

    rig.press(200, L);
    assert_eq!(rig.release(210, ENTER), KeyAction::Block);
    assert_eq!(rig.press(220, ENTER), KeyAction::Block);
    assert_eq!(rig.status(), Status::SecondPressed);
    rig.release(240, ENTER);
    assert_eq!(rig.status(), Status::DecidedTap);
    rig.release(260, L);
    assert_eq!(
        rig.out(),
        vec![
            "down KC_LCTL",
            "up KC_LCTL",
            "down KC_A",
            "down KC_M",
            "down KC_ENT",
            "gap",
            "up KC_A",
            "up KC_M",
            "down KC_LCTL",
            "up KC_LCTL",
            "down KC_A",
            "gap",
            "up KC_ENT",
            "down KC_ENT",
            "gap",
            "up KC_ENT",
            "gap",
            "up KC_A",
        ]
    );
}

fn fast_streak_settings(reset_immediately: bool) -> Settings {
    Settings {
        fast_streak_tap_enable: true,
        fast_streak_tap_reset_immediately: reset_immediately,
        ..Settings::default()
    }
}

#[test]
fn fast_streak_commits_tap_on_press() {
    let mut rig = Rig::with_settings(Hooks::default(), fast_streak_settings(false));
    assert_eq!(rig.press(0, M), KeyAction::Pass);
    rig.release(30, M);
    assert_eq!(rig.press(60, L), KeyAction::Block);
    assert_eq!(rig.status(), Status::DecidedTap);
    rig.release(100, L);
    assert_eq!(rig.status(), Status::Idle);
    assert_eq!(rig.out(), vec!["down KC_M", "up KC_M", "down KC_A", "gap", "up KC_A"]);
}

#[test]
fn fast_streak_reset_defers_the_pth_release() {
    let mut rig = Rig::with_settings(Hooks::default(), fast_streak_settings(true));
    rig.press(0, M);
    rig.release(30, M);
    rig.press(60, L);
    assert_eq!(rig.status(), Status::Idle);
    assert_eq!(rig.press(80, R), KeyAction::Pass);
    assert_eq!(rig.release(100, L), KeyAction::Block);
    rig.release(120, R);
    assert_eq!(
        rig.out(),
        vec!["down KC_M", "up KC_M", "down KC_A", "down KC_K", "up KC_A", "up KC_K"]
    );
}

#[test]
fn slow_press_is_not_a_fast_streak() {
    let mut rig = Rig::with_settings(Hooks::default(), fast_streak_settings(false));
    rig.press(0, M);
    rig.release(30, M);
    rig.press(300, L);
    assert_eq!(rig.status(), Status::Pressed);
}

#[test]
fn unmapped_second_on_instant_layer_commits_tap() {
    let mut rig = Rig::new(Hooks::default());
    rig.press(0, SPACE);
    assert_eq!(rig.out(), vec!["layer 1 on"]);
    rig.press(30, NAV_HOLE);
    assert_eq!(rig.status(), Status::DecidedTap);
    assert_eq!(rig.engine.second_keycode(), KC_L);
    rig.release(60, NAV_HOLE);
    rig.release(90, SPACE);
    assert_eq!(
        rig.out(),
        vec![
            "layer 1 on",
            "layer 1 off",
            "down KC_SPC",
            "down KC_L",
            "gap",
            "up KC_L",
            "gap",
            "up KC_SPC",
        ]
    );
}

#[test]
fn third_press_on_instant_layer_resolves_on_base_after_tap() {
    let mut rig = Rig::new(Hooks {
        predict_hold_when_third_press: always_tap,
        ..Hooks::default()
    });
    rig.press(0, SPACE);
    rig.press(20, M);
    assert_eq!(rig.engine.second_keycode(), KC_LEFT);
    assert_eq!(rig.engine.second_keycode_on_same_layer_as_pth(), KC_M);
    rig.press(40, NAV_HOLE);
    assert_eq!(rig.status(), Status::DecidedTap);
    rig.release(70, NAV_HOLE);
    rig.release(80, M);
    rig.release(90, SPACE);
    assert_eq!(
        rig.out(),
        vec![
            "layer 1 on",
            "layer 1 off",
            "down KC_SPC",
            "down KC_M",
            "down KC_L",
            "up KC_L",
            "gap",
            "up KC_M",
            "gap",
            "up KC_SPC",
        ]
    );
}
