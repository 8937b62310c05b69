//! 16-bit keycode model shared with the host firmware.
//!
//! Layout of the keycode space:
//!
//! | Range             | Meaning                                   |
//! |-------------------|-------------------------------------------|
//! | `0x0000..=0x00FF` | basic HID usages                          |
//! | `0x0100..=0x1FFF` | modded keys, `(mods5 << 8) \| kc`         |
//! | `0x2000..=0x3FFF` | mod-tap, `MT(mods5, kc)`                  |
//! | `0x4000..=0x4FFF` | layer-tap, `LT(layer, kc)`                |
//! | `0x5600..=0x56FF` | swap-hands (`0x56F0..=0x56F6` are actions) |
//! | `0x5700..=0x57FF` | tap dance                                 |

use crate::error::KeycodeError;
use lazy_static::lazy_static;
use std::collections::HashMap;

pub const KC_NO: u16 = 0x0000;
pub const KC_TRNS: u16 = 0x0001;

pub const KC_A: u16 = 0x0004;
pub const KC_B: u16 = 0x0005;
pub const KC_C: u16 = 0x0006;
pub const KC_D: u16 = 0x0007;
pub const KC_E: u16 = 0x0008;
pub const KC_F: u16 = 0x0009;
pub const KC_G: u16 = 0x000A;
pub const KC_H: u16 = 0x000B;
pub const KC_I: u16 = 0x000C;
pub const KC_J: u16 = 0x000D;
pub const KC_K: u16 = 0x000E;
pub const KC_L: u16 = 0x000F;
pub const KC_M: u16 = 0x0010;
pub const KC_N: u16 = 0x0011;
pub const KC_O: u16 = 0x0012;
pub const KC_P: u16 = 0x0013;
pub const KC_Q: u16 = 0x0014;
pub const KC_R: u16 = 0x0015;
pub const KC_S: u16 = 0x0016;
pub const KC_T: u16 = 0x0017;
pub const KC_U: u16 = 0x0018;
pub const KC_V: u16 = 0x0019;
pub const KC_W: u16 = 0x001A;
pub const KC_X: u16 = 0x001B;
pub const KC_Y: u16 = 0x001C;
pub const KC_Z: u16 = 0x001D;

pub const KC_ENT: u16 = 0x0028;
pub const KC_ESC: u16 = 0x0029;
pub const KC_BSPC: u16 = 0x002A;
pub const KC_TAB: u16 = 0x002B;
pub const KC_SPC: u16 = 0x002C;
pub const KC_MINS: u16 = 0x002D;
pub const KC_EQL: u16 = 0x002E;
pub const KC_LBRC: u16 = 0x002F;
pub const KC_RBRC: u16 = 0x0030;
pub const KC_BSLS: u16 = 0x0031;
pub const KC_SCLN: u16 = 0x0033;
pub const KC_QUOT: u16 = 0x0034;
pub const KC_GRV: u16 = 0x0035;
pub const KC_COMM: u16 = 0x0036;
pub const KC_DOT: u16 = 0x0037;
pub const KC_SLSH: u16 = 0x0038;

pub const KC_F1: u16 = 0x003A;
pub const KC_F12: u16 = 0x0045;
pub const KC_RGHT: u16 = 0x004F;
pub const KC_LEFT: u16 = 0x0050;
pub const KC_DOWN: u16 = 0x0051;
pub const KC_UP: u16 = 0x0052;
pub const KC_F13: u16 = 0x0068;
pub const KC_F23: u16 = 0x0072;
pub const KC_F24: u16 = 0x0073;
pub const KC_BTN1: u16 = 0x00D1;

pub const KC_LCTL: u16 = 0x00E0;
pub const KC_LSFT: u16 = 0x00E1;
pub const KC_LALT: u16 = 0x00E2;
pub const KC_LGUI: u16 = 0x00E3;
pub const KC_RCTL: u16 = 0x00E4;
pub const KC_RSFT: u16 = 0x00E5;
pub const KC_RALT: u16 = 0x00E6;
pub const KC_RGUI: u16 = 0x00E7;

// 5-bit modifier encoding used inside modded keys and mod-taps.
pub const MOD_LCTL: u8 = 0x01;
pub const MOD_LSFT: u8 = 0x02;
pub const MOD_LALT: u8 = 0x04;
pub const MOD_LGUI: u8 = 0x08;
pub const MOD_RCTL: u8 = 0x11;
pub const MOD_RSFT: u8 = 0x12;
pub const MOD_RALT: u8 = 0x14;
pub const MOD_RGUI: u8 = 0x18;

// 8-bit modifier masks as found in a HID report.
pub const MOD_BIT_LCTRL: u8 = 0x01;
pub const MOD_BIT_LSHIFT: u8 = 0x02;
pub const MOD_BIT_LALT: u8 = 0x04;
pub const MOD_BIT_LGUI: u8 = 0x08;
pub const MOD_MASK_CTRL: u8 = 0x11;
pub const MOD_MASK_SHIFT: u8 = 0x22;
pub const MOD_MASK_ALT: u8 = 0x44;
pub const MOD_MASK_GUI: u8 = 0x88;
pub const MOD_MASK_CG: u8 = MOD_MASK_CTRL | MOD_MASK_GUI;

pub const QK_MODS: u16 = 0x0100;
pub const QK_MODS_MAX: u16 = 0x1FFF;
pub const QK_MOD_TAP: u16 = 0x2000;
pub const QK_MOD_TAP_MAX: u16 = 0x3FFF;
pub const QK_LAYER_TAP: u16 = 0x4000;
pub const QK_LAYER_TAP_MAX: u16 = 0x4FFF;
pub const QK_SWAP_HANDS: u16 = 0x5600;
pub const QK_SWAP_HANDS_MAX: u16 = 0x56FF;
pub const SH_TOGG: u16 = 0x56F0;
pub const SH_OS: u16 = 0x56F6;
pub const QK_TAP_DANCE: u16 = 0x5700;
pub const QK_TAP_DANCE_MAX: u16 = 0x57FF;

pub const fn mt(mods5: u8, kc: u16) -> u16 {
    QK_MOD_TAP | (((mods5 & 0x1F) as u16) << 8) | (kc & 0xFF)
}

pub const fn lt(layer: u8, kc: u16) -> u16 {
    QK_LAYER_TAP | (((layer & 0x0F) as u16) << 8) | (kc & 0xFF)
}

pub const fn sh_t(kc: u16) -> u16 {
    QK_SWAP_HANDS | (kc & 0xFF)
}

pub const fn td(index: u8) -> u16 {
    QK_TAP_DANCE | index as u16
}

/// Modded key: `kc` sent with the given 5-bit modifiers.
pub const fn with_mods(mods5: u8, kc: u16) -> u16 {
    (((mods5 & 0x1F) as u16) << 8) | (kc & 0xFF)
}

pub const fn lctl(kc: u16) -> u16 {
    with_mods(MOD_LCTL, kc)
}

pub const fn lsft(kc: u16) -> u16 {
    with_mods(MOD_LSFT, kc)
}

pub const fn lalt(kc: u16) -> u16 {
    with_mods(MOD_LALT, kc)
}

pub const fn lgui(kc: u16) -> u16 {
    with_mods(MOD_LGUI, kc)
}

pub const fn lsa(kc: u16) -> u16 {
    with_mods(MOD_LSFT | MOD_LALT, kc)
}

pub const fn is_mod_tap(kc: u16) -> bool {
    kc >= QK_MOD_TAP && kc <= QK_MOD_TAP_MAX
}

pub const fn is_layer_tap(kc: u16) -> bool {
    kc >= QK_LAYER_TAP && kc <= QK_LAYER_TAP_MAX
}

pub const fn is_swap_hands(kc: u16) -> bool {
    kc >= QK_SWAP_HANDS && kc <= QK_SWAP_HANDS_MAX
}

/// Swap-hands actions (toggle, one-shot...) that carry no tap keycode.
pub const fn is_swap_hands_action(kc: u16) -> bool {
    kc >= SH_TOGG && kc <= SH_OS
}

pub const fn is_tap_dance(kc: u16) -> bool {
    kc >= QK_TAP_DANCE && kc <= QK_TAP_DANCE_MAX
}

pub const fn is_modded(kc: u16) -> bool {
    kc >= QK_MODS && kc <= QK_MODS_MAX
}

pub const fn is_modifier(kc: u16) -> bool {
    kc >= KC_LCTL && kc <= KC_RGUI
}

/// Keys the engine disambiguates: mod-taps, layer-taps and swap-hands taps.
pub const fn is_tap_hold(kc: u16) -> bool {
    if is_mod_tap(kc) || is_layer_tap(kc) {
        return true;
    }
    is_swap_hands(kc) && !is_swap_hands_action(kc)
}

/// Basic keycode sent when a tap-hold key resolves as tap.
pub const fn tap_keycode(kc: u16) -> u16 {
    if is_tap_hold(kc) || is_modded(kc) {
        kc & 0xFF
    } else {
        kc
    }
}

pub const fn mod_tap_mods(kc: u16) -> u8 {
    ((kc >> 8) & 0x1F) as u8
}

pub const fn modded_mods(kc: u16) -> u8 {
    ((kc >> 8) & 0x1F) as u8
}

pub const fn layer_tap_layer(kc: u16) -> u8 {
    ((kc >> 8) & 0x0F) as u8
}

/// Converts the 5-bit form (bit 4 selects the right hand) to a HID modifier byte.
pub const fn mods_5_to_8_bit(mods5: u8) -> u8 {
    if mods5 & 0x10 == 0 {
        mods5 & 0x0F
    } else {
        (mods5 & 0x0F) << 4
    }
}

pub const fn mod_tap_mods_8_bit(kc: u16) -> u8 {
    mods_5_to_8_bit(mod_tap_mods(kc))
}

pub const fn is_mod_tap_with_any_mods_of(kc: u16, mods8: u8) -> bool {
    is_mod_tap(kc) && (mod_tap_mods_8_bit(kc) & mods8) != 0
}

/// Modifier keycodes (`KC_LCTL`...) making up an 8-bit modifier mask.
pub fn modifier_keycodes(mods8: u8) -> impl Iterator<Item = u16> {
    (0..8u16).filter(move |&bit| mods8 & (1u8 << bit) != 0).map(|bit| KC_LCTL + bit)
}

const BASIC_KEYCODES: &[(&str, u16)] = &[
    ("KC_NO", KC_NO),
    ("KC_TRNS", KC_TRNS),
    ("KC_A", KC_A),
    ("KC_B", KC_B),
    ("KC_C", KC_C),
    ("KC_D", KC_D),
    ("KC_E", KC_E),
    ("KC_F", KC_F),
    ("KC_G", KC_G),
    ("KC_H", KC_H),
    ("KC_I", KC_I),
    ("KC_J", KC_J),
    ("KC_K", KC_K),
    ("KC_L", KC_L),
    ("KC_M", KC_M),
    ("KC_N", KC_N),
    ("KC_O", KC_O),
    ("KC_P", KC_P),
    ("KC_Q", KC_Q),
    ("KC_R", KC_R),
    ("KC_S", KC_S),
    ("KC_T", KC_T),
    ("KC_U", KC_U),
    ("KC_V", KC_V),
    ("KC_W", KC_W),
    ("KC_X", KC_X),
    ("KC_Y", KC_Y),
    ("KC_Z", KC_Z),
    ("KC_1", 0x1E),
    ("KC_2", 0x1F),
    ("KC_3", 0x20),
    ("KC_4", 0x21),
    ("KC_5", 0x22),
    ("KC_6", 0x23),
    ("KC_7", 0x24),
    ("KC_8", 0x25),
    ("KC_9", 0x26),
    ("KC_0", 0x27),
    ("KC_ENT", KC_ENT),
    ("KC_ESC", KC_ESC),
    ("KC_BSPC", KC_BSPC),
    ("KC_TAB", KC_TAB),
    ("KC_SPC", KC_SPC),
    ("KC_MINS", KC_MINS),
    ("KC_EQL", KC_EQL),
    ("KC_LBRC", KC_LBRC),
    ("KC_RBRC", KC_RBRC),
    ("KC_BSLS", KC_BSLS),
    ("KC_SCLN", KC_SCLN),
    ("KC_QUOT", KC_QUOT),
    ("KC_GRV", KC_GRV),
    ("KC_COMM", KC_COMM),
    ("KC_DOT", KC_DOT),
    ("KC_SLSH", KC_SLSH),
    ("KC_F1", 0x3A),
    ("KC_F2", 0x3B),
    ("KC_F3", 0x3C),
    ("KC_F4", 0x3D),
    ("KC_F5", 0x3E),
    ("KC_F6", 0x3F),
    ("KC_F7", 0x40),
    ("KC_F8", 0x41),
    ("KC_F9", 0x42),
    ("KC_F10", 0x43),
    ("KC_F11", 0x44),
    ("KC_F12", 0x45),
    ("KC_RGHT", KC_RGHT),
    ("KC_LEFT", KC_LEFT),
    ("KC_DOWN", KC_DOWN),
    ("KC_UP", KC_UP),
    ("KC_F13", 0x68),
    ("KC_F14", 0x69),
    ("KC_F15", 0x6A),
    ("KC_F16", 0x6B),
    ("KC_F17", 0x6C),
    ("KC_F18", 0x6D),
    ("KC_F19", 0x6E),
    ("KC_F20", 0x6F),
    ("KC_F21", 0x70),
    ("KC_F22", 0x71),
    ("KC_F23", KC_F23),
    ("KC_F24", KC_F24),
    ("KC_BTN1", KC_BTN1),
    ("KC_LCTL", KC_LCTL),
    ("KC_LSFT", KC_LSFT),
    ("KC_LALT", KC_LALT),
    ("KC_LGUI", KC_LGUI),
    ("KC_RCTL", KC_RCTL),
    ("KC_RSFT", KC_RSFT),
    ("KC_RALT", KC_RALT),
    ("KC_RGUI", KC_RGUI),
];

const MOD_NAMES: &[(&str, u8)] = &[
    ("MOD_LCTL", MOD_LCTL),
    ("MOD_LSFT", MOD_LSFT),
    ("MOD_LALT", MOD_LALT),
    ("MOD_LGUI", MOD_LGUI),
    ("MOD_RCTL", MOD_RCTL),
    ("MOD_RSFT", MOD_RSFT),
    ("MOD_RALT", MOD_RALT),
    ("MOD_RGUI", MOD_RGUI),
];

lazy_static! {
    static ref NAME_TO_CODE: HashMap<&'static str, u16> = BASIC_KEYCODES.iter().copied().collect();
    static ref CODE_TO_NAME: HashMap<u16, &'static str> =
        BASIC_KEYCODES.iter().map(|&(name, code)| (code, name)).collect();
}

fn basic_name(kc: u16) -> String {
    match CODE_TO_NAME.get(&kc) {
        Some(name) => (*name).to_string(),
        None => format!("0x{:04X}", kc),
    }
}

fn mods_name(mods5: u8) -> String {
    // The right-hand bit applies to the whole set.
    let right = mods5 & 0x10;
    let names: Vec<&str> = MOD_NAMES
        .iter()
        .filter(|&&(_, bit)| bit & 0x10 == right && (bit & 0x0F) & mods5 != 0)
        .map(|&(name, _)| name)
        .collect();
    if names.is_empty() {
        format!("0x{:02X}", mods5)
    } else {
        names.join("|")
    }
}

/// Human readable name used in logs and by the replay tool.
pub fn keycode_name(kc: u16) -> String {
    if is_mod_tap(kc) {
        return format!("MT({},{})", mods_name(mod_tap_mods(kc)), basic_name(kc & 0xFF));
    }
    if is_layer_tap(kc) {
        return format!("LT({},{})", layer_tap_layer(kc), basic_name(kc & 0xFF));
    }
    if is_swap_hands(kc) && !is_swap_hands_action(kc) {
        return format!("SH_T({})", basic_name(kc & 0xFF));
    }
    if is_tap_dance(kc) {
        return format!("TD({})", kc & 0xFF);
    }
    if is_modded(kc) {
        let inner = basic_name(kc & 0xFF);
        return match modded_mods(kc) {
            MOD_LCTL => format!("LCTL({})", inner),
            MOD_LSFT => format!("LSFT({})", inner),
            MOD_LALT => format!("LALT({})", inner),
            MOD_LGUI => format!("LGUI({})", inner),
            m if m == MOD_LSFT | MOD_LALT => format!("LSA({})", inner),
            m => format!("MODS({},{})", mods_name(m), inner),
        };
    }
    basic_name(kc)
}

fn parse_number<T: TryFrom<u32>>(s: &str) -> Option<T> {
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        s.parse::<u32>().ok()?
    };
    T::try_from(value).ok()
}

fn parse_mods(s: &str) -> Result<u8, KeycodeError> {
    let mut mods = 0u8;
    for part in s.split('|').map(str::trim) {
        let bit = MOD_NAMES
            .iter()
            .find(|&&(name, _)| name == part)
            .map(|&(_, bit)| bit)
            .or_else(|| parse_number::<u8>(part))
            .ok_or_else(|| KeycodeError::UnknownModifier(part.to_string()))?;
        mods |= bit;
    }
    Ok(mods)
}

/// Splits `NAME(args)` into `("NAME", "args")`.
fn split_call(s: &str) -> Option<(&str, &str)> {
    let open = s.find('(')?;
    let inner = s[open + 1..].strip_suffix(')')?;
    Some((s[..open].trim(), inner.trim()))
}

/// Splits on the first top-level comma.
fn split_args(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((s[..i].trim(), s[i + 1..].trim())),
            _ => {}
        }
    }
    None
}

/// Parses a keycode expression such as `KC_A`, `MT(MOD_LCTL|MOD_LSFT,KC_A)`,
/// `LT(1,KC_E)`, `LALT(KC_TAB)` or `0x2004`.
pub fn parse_keycode(expr: &str) -> Result<u16, KeycodeError> {
    let s = expr.trim();
    if s.is_empty() {
        return Err(KeycodeError::Empty);
    }
    if let Some(&code) = NAME_TO_CODE.get(s) {
        return Ok(code);
    }
    if s.starts_with("0x") || s.starts_with("0X") {
        return parse_number::<u16>(s).ok_or_else(|| KeycodeError::InvalidNumber(s.to_string()));
    }
    let (func, args) = split_call(s).ok_or_else(|| KeycodeError::UnknownKeycode(s.to_string()))?;
    let single = |args: &str| -> Result<u16, KeycodeError> { Ok(parse_keycode(args)? & 0xFF) };
    match func {
        "MT" => {
            let (mods, kc) = split_args(args).ok_or_else(|| KeycodeError::MissingArgument(s.to_string()))?;
            Ok(mt(parse_mods(mods)?, single(kc)?))
        }
        "LT" => {
            let (layer, kc) = split_args(args).ok_or_else(|| KeycodeError::MissingArgument(s.to_string()))?;
            let layer = parse_number::<u8>(layer)
                .filter(|l| *l < 16)
                .ok_or_else(|| KeycodeError::InvalidNumber(layer.to_string()))?;
            Ok(lt(layer, single(kc)?))
        }
        "LCTL_T" => Ok(mt(MOD_LCTL, single(args)?)),
        "LSFT_T" => Ok(mt(MOD_LSFT, single(args)?)),
        "LALT_T" => Ok(mt(MOD_LALT, single(args)?)),
        "LGUI_T" => Ok(mt(MOD_LGUI, single(args)?)),
        "RCTL_T" => Ok(mt(MOD_RCTL, single(args)?)),
        "RSFT_T" => Ok(mt(MOD_RSFT, single(args)?)),
        "RALT_T" => Ok(mt(MOD_RALT, single(args)?)),
        "RGUI_T" => Ok(mt(MOD_RGUI, single(args)?)),
        "SH_T" => Ok(sh_t(single(args)?)),
        "TD" => parse_number::<u8>(args)
            .map(td)
            .ok_or_else(|| KeycodeError::InvalidNumber(args.to_string())),
        "LCTL" | "LSFT" | "LALT" | "LGUI" | "LSA" => {
            let mods = match func {
                "LCTL" => MOD_LCTL,
                "LSFT" => MOD_LSFT,
                "LALT" => MOD_LALT,
                "LGUI" => MOD_LGUI,
                _ => MOD_LSFT | MOD_LALT,
            };
            let inner = parse_keycode(args)?;
            // Nested wrappers accumulate, e.g. LCTL(LSFT(KC_A)).
            let inner_mods = if is_modded(inner) { modded_mods(inner) } else { 0 };
            Ok(with_mods(mods | inner_mods, inner & 0xFF))
        }
        _ => Err(KeycodeError::UnknownKeycode(s.to_string())),
    }
}
