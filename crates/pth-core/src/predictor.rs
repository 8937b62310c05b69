//! Baked prediction model.
//!
//! Three classification trees and one regression expression, trained
//! offline on typing logs. They are pure functions over
//! [`PredictionInputs`] and must stay bit-exact: thresholds and leaves are
//! part of the model, not tunables.
#![allow(clippy::excessive_precision)]

use crate::keycodes::{self, MOD_BIT_LALT, MOD_MASK_CG};
use crate::timing::PthSnapshot;

/// A prediction above this (after scaling by the factor) means hold.
pub const HOLD_THRESHOLD: f32 = 0.5;

/// Presses closer than this to the previous one may be a fast streak.
pub const FAST_STREAK_TAP_THRESHOLD_MS: i16 = 125;

const OVERLAP_C1: f32 = 20145.72453837935;
const OVERLAP_C2: f32 = 20141.63979839019;
const OVERLAP_K: f32 = 10.24699665838974;
const OVERLAP_OFFSET: f32 = 32.559018051648636;

const FAST_STREAK_C: f32 = 4.280551301886473;
const CONSERVATIVE_STREAK_C: f32 = 5.3131340976019885;

/// Everything the model looks at, captured by the engine as the PTH
/// lifecycle progresses. Durations are in ms and saturate at `MAX_DUR`;
/// `-1` marks history that does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionInputs {
    pub prev_prev_press_to_prev_press_dur: i16,
    pub prev_press_to_pth_press_dur: i16,
    pub prev_prev_overlap_dur: i16,
    pub prev_overlap_dur: i16,
    pub press_to_press_w_avg: f32,
    pub overlap_w_avg: f32,
    pub key_release_before_pth_to_pth_press_dur: u16,
    pub pth_press_to_second_press_dur: u16,
    pub pth_press_to_second_release_dur: u16,
    pub second_dur: u16,
    pub second_press_to_third_press_dur: u16,
    /// Whether the second key has been released, making the two fields
    /// above meaningful.
    pub second_to_be_released: bool,
    /// Keys down right now, as counted by the timing ledger.
    pub down_count: u8,
}

impl Default for PredictionInputs {
    fn default() -> Self {
        Self::from_snapshot(&PthSnapshot::default())
    }
}

impl PredictionInputs {
    pub fn from_snapshot(snap: &PthSnapshot) -> Self {
        Self {
            prev_prev_press_to_prev_press_dur: snap.prev_prev_press_to_prev_press_dur,
            prev_press_to_pth_press_dur: snap.prev_press_to_pth_press_dur,
            prev_prev_overlap_dur: snap.prev_prev_overlap_dur,
            prev_overlap_dur: snap.prev_overlap_dur,
            press_to_press_w_avg: snap.press_to_press_w_avg,
            overlap_w_avg: snap.overlap_w_avg,
            key_release_before_pth_to_pth_press_dur: snap.key_release_before_pth_to_pth_press_dur,
            pth_press_to_second_press_dur: 0,
            pth_press_to_second_release_dur: 0,
            second_dur: 0,
            second_press_to_third_press_dur: 0,
            second_to_be_released: false,
            down_count: 0,
        }
    }
}

/// `x / y`, or `x` when `y` is zero.
pub fn safe_div(x: f32, y: f32) -> f32 {
    if y == 0.0 {
        x
    } else {
        x / y
    }
}

/// Scales hold predictions down for keys whose side byte carries a user
/// value of 1, 2 or 3 (5, 10 or 15 % harder to hold).
pub fn prediction_factor_for_user_value(value: u8) -> f32 {
    match value {
        1..=3 => 1.0 - value as f32 * 0.05,
        _ => 1.0,
    }
}

pub fn is_hold(probability: f32, factor: f32) -> bool {
    probability * factor > HOLD_THRESHOLD
}

/// Probability of hold once a third key is pressed while the PTH and the
/// second key are both undecided.
pub fn hold_probability_when_third_press(i: &PredictionInputs) -> f32 {
    let (next_dur, pth_down_next_up_dur) = if i.second_to_be_released {
        (i.second_dur as f32, i.pth_press_to_second_release_dur as f32)
    } else {
        (-1.0f32, -1.0f32)
    };

    if i.prev_press_to_pth_press_dur <= 759 {
        if pth_down_next_up_dur <= 150.0 {
            if i.pth_press_to_second_press_dur <= 170 {
                if i.second_press_to_third_press_dur <= 107 {
                    0.040555656
                } else if pth_down_next_up_dur <= 109.0 {
                    0.14262922
                } else if i.pth_press_to_second_press_dur <= 55 {
                    0.3217576
                } else {
                    0.8006757
                }
            } else if i.pth_press_to_second_press_dur <= 216 {
                if i.down_count == 0 {
                    if i.second_press_to_third_press_dur <= 77 {
                        0.38718662
                    } else {
                        0.6451292
                    }
                } else {
                    0.22810061
                }
            } else if i.down_count == 0 {
                0.910299
            } else if i.pth_press_to_second_press_dur <= 264 {
                0.4814815
            } else {
                0.8877551
            }
        } else if i.second_press_to_third_press_dur <= 145 {
            if i.pth_press_to_second_press_dur <= 92 {
                if i.down_count == 0 {
                    if i.key_release_before_pth_to_pth_press_dur <= 112 {
                        0.43078628
                    } else {
                        0.6967871
                    }
                } else if i.press_to_press_w_avg <= 63.602364 {
                    0.51724136
                } else {
                    0.16554306
                }
            } else if i.down_count == 0 {
                0.82194614
            } else if i.press_to_press_w_avg <= 105.37883 {
                0.64830506
            } else {
                0.35095447
            }
        } else if i.pth_press_to_second_press_dur <= 59 {
            if next_dur <= 130.0 {
                0.6714801
            } else if i.prev_press_to_pth_press_dur <= 303 {
                0.27037036
            } else {
                0.7083333
            }
        } else {
            0.93728805
        }
    } else if i.press_to_press_w_avg <= 994.01086 {
        if pth_down_next_up_dur <= 120.0 {
            if i.pth_press_to_second_press_dur <= 139 {
                if i.key_release_before_pth_to_pth_press_dur <= 443 {
                    0.84
                } else if i.key_release_before_pth_to_pth_press_dur <= 1110 {
                    0.12546816
                } else {
                    0.54545456
                }
            } else {
                0.83798885
            }
        } else if i.second_press_to_third_press_dur <= 127 {
            if i.pth_press_to_second_press_dur <= 146 {
                if i.key_release_before_pth_to_pth_press_dur <= 916 {
                    0.4074074
                } else {
                    0.9166667
                }
            } else {
                0.9607843
            }
        } else {
            0.97471267
        }
    } else if i.pth_press_to_second_press_dur <= 19 {
        0.06451613
    } else if i.prev_press_to_pth_press_dur <= 1449 {
        if i.pth_press_to_second_press_dur <= 111 {
            if i.key_release_before_pth_to_pth_press_dur <= 1777 {
                0.6754386
            } else {
                0.1
            }
        } else {
            0.9519231
        }
    } else {
        0.99276936
    }
}

/// Probability of hold when the PTH is released while the second key is
/// still down.
pub fn hold_probability_when_pth_release_after_second_press(i: &PredictionInputs) -> f32 {
    if i.prev_press_to_pth_press_dur <= 1254 {
        if i.pth_press_to_second_press_dur <= 214 {
            if i.pth_press_to_second_press_dur <= 168 {
                if i.prev_press_to_pth_press_dur <= 237 {
                    0.021824066
                } else if i.pth_press_to_second_press_dur <= 124 {
                    0.06581373
                } else if i.prev_prev_press_to_prev_press_dur <= 1603 {
                    0.12980974
                } else {
                    0.6515581
                }
            } else if i.key_release_before_pth_to_pth_press_dur <= 169 {
                0.1548253
            } else if i.pth_press_to_second_press_dur <= 186 {
                if i.press_to_press_w_avg <= 822.32574 {
                    0.3386316
                } else {
                    0.6540284
                }
            } else if i.prev_press_to_pth_press_dur <= 226 {
                0.10697675
            } else {
                0.53629214
            }
        } else if i.pth_press_to_second_press_dur <= 247 {
            if i.key_release_before_pth_to_pth_press_dur <= 162 {
                if i.overlap_w_avg <= 0.13447072 {
                    if i.prev_prev_press_to_prev_press_dur <= 165 {
                        0.63566846
                    } else {
                        0.41175103
                    }
                } else {
                    0.24768922
                }
            } else if i.down_count == 0 {
                if i.overlap_w_avg <= 17.07778 {
                    0.7658702
                } else {
                    0.4507772
                }
            } else {
                0.08022922
            }
        } else if i.down_count == 0 {
            0.88925225
        } else if i.pth_press_to_second_press_dur <= 312 {
            0.26601785
        } else if i.prev_press_to_pth_press_dur <= 181 {
            0.7529976
        } else {
            0.23684211
        }
    } else if i.key_release_before_pth_to_pth_press_dur <= 1350 {
        if i.pth_press_to_second_press_dur <= 139 {
            if i.key_release_before_pth_to_pth_press_dur <= 1273 {
                if i.prev_prev_press_to_prev_press_dur <= 1588 {
                    if i.key_release_before_pth_to_pth_press_dur <= 539 {
                        0.5905512
                    } else {
                        0.25539857
                    }
                } else if i.key_release_before_pth_to_pth_press_dur <= 102 {
                    0.083333336
                } else {
                    0.8053435
                }
            } else if i.press_to_press_w_avg <= 1096.1167 {
                if i.pth_press_to_second_press_dur <= 89 {
                    0.4801762
                } else {
                    0.7108014
                }
            } else {
                0.42533332
            }
        } else {
            0.89287937
        }
    } else if i.pth_press_to_second_press_dur <= 17 {
        if i.prev_prev_press_to_prev_press_dur <= 146 {
            0.01754386
        } else if i.key_release_before_pth_to_pth_press_dur <= 3116 {
            0.04477612
        } else if i.key_release_before_pth_to_pth_press_dur <= 3243 {
            0.5714286
        } else {
            0.09090909
        }
    } else if i.key_release_before_pth_to_pth_press_dur <= 1504 {
        0.9103782
    } else if i.down_count == 0 {
        0.98845273
    } else {
        0.046153847
    }
}

/// Probability of hold when the PTH is released after the second key was
/// pressed and released.
pub fn hold_probability_when_pth_release_after_second_release(i: &PredictionInputs) -> f32 {
    let next_dur = i.second_dur;
    let pth_down_next_up_dur = i.pth_press_to_second_release_dur;

    if pth_down_next_up_dur <= 143 {
        if i.prev_press_to_pth_press_dur <= 1292 {
            if pth_down_next_up_dur <= 116 {
                0.09534535
            } else if i.key_release_before_pth_to_pth_press_dur <= 118 {
                0.27736303
            } else if i.prev_press_to_pth_press_dur <= 174 {
                0.08959538
            } else if i.pth_press_to_second_press_dur <= 29 {
                0.32664755
            } else {
                0.65463656
            }
        } else if i.pth_press_to_second_press_dur <= 19 {
            0.1
        } else if pth_down_next_up_dur <= 64 {
            if i.key_release_before_pth_to_pth_press_dur <= 2050 {
                0.0625
            } else if i.press_to_press_w_avg <= 2830.7092 {
                0.71428573
            } else {
                0.5
            }
        } else if i.key_release_before_pth_to_pth_press_dur <= 1244 {
            if pth_down_next_up_dur <= 107 {
                0.33333334
            } else {
                0.85714287
            }
        } else {
            0.99616855
        }
    } else if i.key_release_before_pth_to_pth_press_dur <= 125 {
        if i.pth_press_to_second_press_dur <= 107 {
            if i.down_count == 0 {
                if i.pth_press_to_second_press_dur <= 77 {
                    if i.key_release_before_pth_to_pth_press_dur <= 47 {
                        0.42004812
                    } else {
                        0.58709514
                    }
                } else {
                    0.70079845
                }
            } else {
                0.24063401
            }
        } else if pth_down_next_up_dur <= 182 {
            if i.prev_prev_overlap_dur <= 0 {
                if next_dur <= 43 {
                    0.4791367
                } else {
                    0.8005192
                }
            } else if next_dur <= 54 {
                0.23857868
            } else {
                0.50877196
            }
        } else if i.pth_press_to_second_press_dur <= 167 {
            0.8571564
        } else if next_dur <= 17 {
            0.30452675
        } else {
            0.96995705
        }
    } else if i.down_count == 0 {
        if i.press_to_press_w_avg <= 867.94495 {
            0.94516844
        } else if i.pth_press_to_second_press_dur <= 11 {
            0.14285715
        } else {
            0.9992744
        }
    } else if i.prev_prev_press_to_prev_press_dur <= 311 {
        if pth_down_next_up_dur <= 238 {
            0.15384616
        } else if i.pth_press_to_second_press_dur <= 175 {
            0.43137255
        } else {
            0.74390244
        }
    } else if pth_down_next_up_dur <= 178 {
        if i.prev_press_to_pth_press_dur <= 96 {
            0.54285717
        } else {
            0.0952381
        }
    } else if i.prev_press_to_pth_press_dur <= 187 {
        0.91690546
    } else {
        0.2
    }
}

/// Estimated overlap (ms) between the PTH and the second key beyond which
/// the PTH is meant as hold.
pub fn overlap_ms_for_hold(i: &PredictionInputs) -> u16 {
    let p2s = i.pth_press_to_second_press_dur as f32;
    let ppp = i.prev_press_to_pth_press_dur as f32;
    let ppo = i.prev_prev_overlap_dur as f32;

    let by_ratio = p2s * safe_div(OVERLAP_C1, OVERLAP_C1 - (ppp - ppo) * p2s);
    let by_history = safe_div(OVERLAP_C2 - ((ppp - 2.0 * ppo) - ppo) * OVERLAP_K, p2s) - OVERLAP_OFFSET;
    let guess = if by_ratio > by_history { by_ratio } else { by_history };
    guess.abs() as u16
}

/// Overlap threshold before clamping. `factor` is the prediction factor of
/// the PTH; a same-side second makes the threshold larger.
pub fn min_overlap_for_hold_ms(i: &PredictionInputs, factor: f32, second_same_side: bool) -> u16 {
    let pf = if second_same_side { factor - 0.10 } else { factor };
    let scale = 1.0 + (1.0 - pf);
    (overlap_ms_for_hold(i) as f32 * scale) as u16
}

pub fn fast_streak_tap_score(i: &PredictionInputs) -> f32 {
    let ppp = i.prev_press_to_pth_press_dur as f32;
    let s = i.prev_prev_overlap_dur as f32 - ppp;
    safe_div(s, FAST_STREAK_C - ppp).abs()
}

pub fn conservative_fast_streak_tap_score(i: &PredictionInputs) -> f32 {
    let s = i.prev_prev_overlap_dur as f32 - i.prev_press_to_pth_press_dur as f32;
    safe_div(s, s + CONSERVATIVE_STREAK_C * i.overlap_w_avg).abs()
}

/// Letters and common prose punctuation, unless Ctrl, GUI or left Alt is
/// active. `mods` is the 8-bit modifier state.
pub fn is_fast_streak_tap_key(keycode: u16, mods: u8) -> bool {
    if mods & (MOD_MASK_CG | MOD_BIT_LALT) != 0 {
        return false;
    }
    matches!(
        keycodes::tap_keycode(keycode),
        keycodes::KC_A..=keycodes::KC_Z
            | keycodes::KC_SPC
            | keycodes::KC_DOT
            | keycodes::KC_COMM
            | keycodes::KC_SCLN
            | keycodes::KC_SLSH
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycodes::{lt, mt, KC_A, KC_ENT, KC_SPC, MOD_LCTL};

    /// Inputs as they look for the very first PTH after start-up.
    fn cold_start(p2s: u16) -> PredictionInputs {
        PredictionInputs {
            prev_press_to_pth_press_dur: 4096,
            press_to_press_w_avg: 4096.0,
            key_release_before_pth_to_pth_press_dur: 3996,
            pth_press_to_second_press_dur: p2s,
            down_count: 2,
            ..PredictionInputs::default()
        }
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(3.0, 0.0), 3.0);
        assert_eq!(safe_div(3.0, 2.0), 1.5);
    }

    #[test]
    fn test_prediction_factor() {
        assert_eq!(prediction_factor_for_user_value(0), 1.0);
        assert!((prediction_factor_for_user_value(1) - 0.95).abs() < 1e-6);
        assert!((prediction_factor_for_user_value(3) - 0.85).abs() < 1e-6);
        assert_eq!(prediction_factor_for_user_value(4), 1.0);
        assert!(is_hold(0.6, 1.0));
        assert!(!is_hold(0.55, 0.85));
    }

    #[test]
    fn test_default_inputs_have_no_history() {
        let i = PredictionInputs::default();
        assert_eq!(i.prev_press_to_pth_press_dur, -1);
        assert_eq!(i.prev_prev_overlap_dur, -1);
        assert!(!i.second_to_be_released);
    }

    #[test]
    fn test_third_press_tree() {
        let mut i = cold_start(80);
        i.second_press_to_third_press_dur = 60;
        assert_eq!(hold_probability_when_third_press(&i), 0.99276936);

        // fast typing: second and third follow closely, nothing released yet
        let mut i = cold_start(40);
        i.prev_press_to_pth_press_dur = 100;
        i.press_to_press_w_avg = 100.0;
        i.second_press_to_third_press_dur = 30;
        assert_eq!(hold_probability_when_third_press(&i), 0.040555656);

        // same path, but the second key was released after 130 ms
        i.second_press_to_third_press_dur = 200;
        i.second_to_be_released = true;
        i.pth_press_to_second_release_dur = 130;
        i.second_dur = 90;
        assert_eq!(hold_probability_when_third_press(&i), 0.3217576);
    }

    #[test]
    fn test_release_after_second_press_tree() {
        let mut i = cold_start(90);
        i.down_count = 0;
        assert_eq!(hold_probability_when_pth_release_after_second_press(&i), 0.98845273);
        i.down_count = 1;
        assert_eq!(hold_probability_when_pth_release_after_second_press(&i), 0.046153847);

        let mut i = cold_start(150);
        i.prev_press_to_pth_press_dur = 200;
        assert_eq!(hold_probability_when_pth_release_after_second_press(&i), 0.021824066);
    }

    #[test]
    fn test_release_after_second_release_tree() {
        let mut i = cold_start(90);
        i.down_count = 0;
        i.second_to_be_released = true;
        i.pth_press_to_second_release_dur = 260;
        i.second_dur = 170;
        assert_eq!(hold_probability_when_pth_release_after_second_release(&i), 0.9992744);

        i.pth_press_to_second_release_dur = 100;
        i.prev_press_to_pth_press_dur = 300;
        assert_eq!(hold_probability_when_pth_release_after_second_release(&i), 0.09534535);
    }

    #[test]
    fn test_overlap_for_hold() {
        // |max(-5.20, -275.46)| truncated
        assert_eq!(overlap_ms_for_hold(&cold_start(90)), 5);
        assert_eq!(min_overlap_for_hold_ms(&cold_start(90), 1.0, false), 5);
        // same side with a 15 % harder hold: 5 * 1.25
        assert_eq!(min_overlap_for_hold_ms(&cold_start(90), 0.85, true), 6);
    }

    #[test]
    fn test_overlap_for_hold_zero_p2s() {
        // safe_div keeps the history term finite and negative, so the
        // zeroed ratio term wins
        let i = cold_start(0);
        assert_eq!(overlap_ms_for_hold(&i), 0);
    }

    #[test]
    fn test_fast_streak_keys() {
        assert!(is_fast_streak_tap_key(KC_A, 0));
        assert!(is_fast_streak_tap_key(mt(MOD_LCTL, KC_SPC), 0x02));
        assert!(is_fast_streak_tap_key(lt(1, KC_A), 0x40));
        assert!(!is_fast_streak_tap_key(KC_ENT, 0));
        assert!(!is_fast_streak_tap_key(KC_A, 0x01));
        assert!(!is_fast_streak_tap_key(KC_A, 0x04));
        assert!(!is_fast_streak_tap_key(KC_A, 0x80));
    }

    #[test]
    fn test_streak_scores() {
        let i = PredictionInputs {
            prev_press_to_pth_press_dur: 100,
            prev_prev_overlap_dur: 20,
            overlap_w_avg: 10.0,
            ..PredictionInputs::default()
        };
        let expected = ((20.0f32 - 100.0) / (FAST_STREAK_C - 100.0)).abs();
        assert_eq!(fast_streak_tap_score(&i), expected);
        let s = -80.0f32;
        let expected = (s / (s + CONSERVATIVE_STREAK_C * 10.0)).abs();
        assert_eq!(conservative_fast_streak_tap_score(&i), expected);
    }
}
