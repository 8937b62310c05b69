use crate::error::ConfigError;
use crate::keycodes::{self, KC_F23};
use crate::timing::MAX_DUR;
use serde::{Deserialize, Serialize};

/// Build-time switches of the engine, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// After committing tap, reset to idle right away. Any tap-hold still
    /// overlapping then starts a fresh PTH.
    #[serde(default)]
    pub reset_immediately_when_tap_chosen: bool,
    #[serde(default)]
    pub fast_streak_tap_enable: bool,
    #[serde(default)]
    pub fast_streak_tap_reset_immediately: bool,

    /// Tapped before rolling back an instantly held Alt or GUI so the OS does
    /// not act on a lone modifier tap.
    #[serde(default = "default_suppression_key", with = "keycode_expr")]
    pub instant_mod_tap_suppression_key: u16,

    #[serde(default = "default_min_overlap_ms")]
    pub min_overlap_ms: u16,
    #[serde(default = "default_max_overlap_ms")]
    pub max_overlap_ms: u16,

    /// Per-event diagnostics at debug level.
    #[serde(default)]
    pub debug: bool,

    /// Layer on which the alt-tab companion runs, if any.
    #[serde(default)]
    pub alt_tab_layer: Option<u8>,
}

fn default_suppression_key() -> u16 {
    KC_F23
}

fn default_min_overlap_ms() -> u16 {
    39
}

fn default_max_overlap_ms() -> u16 {
    232
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reset_immediately_when_tap_chosen: false,
            fast_streak_tap_enable: false,
            fast_streak_tap_reset_immediately: false,
            instant_mod_tap_suppression_key: KC_F23,
            min_overlap_ms: 39,
            max_overlap_ms: 232,
            debug: false,
            alt_tab_layer: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_overlap_ms >= MAX_DUR {
            return Err(ConfigError::OverlapTooLong(self.max_overlap_ms));
        }
        if self.min_overlap_ms > self.max_overlap_ms {
            return Err(ConfigError::OverlapRange {
                min: self.min_overlap_ms,
                max: self.max_overlap_ms,
            });
        }
        if keycodes::is_tap_hold(self.instant_mod_tap_suppression_key) {
            return Err(ConfigError::SuppressionKey(self.instant_mod_tap_suppression_key));
        }
        Ok(())
    }

    /// Clamps a predicted overlap into `[min_overlap_ms, max_overlap_ms]`.
    pub fn clamp_overlap(&self, predicted: u16) -> u16 {
        predicted.max(self.min_overlap_ms).min(self.max_overlap_ms)
    }
}

/// Keycodes in settings files are written as expressions (`"KC_F23"`) but
/// raw numbers are accepted too.
mod keycode_expr {
    use crate::keycodes;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Code(u16),
        Expr(String),
    }

    pub fn serialize<S: Serializer>(kc: &u16, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&keycodes::keycode_name(*kc))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Code(kc) => Ok(kc),
            Repr::Expr(expr) => keycodes::parse_keycode(&expr).map_err(de::Error::custom),
        }
    }
}
