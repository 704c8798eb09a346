//! Control-surface configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest arena either registry may be sized to.
pub const MAX_SLOTS: usize = 256;

/// Default analog-to-note scale: full-scale reading of a 6.144 V ADC range
/// mapped over 5 V × 256 steps.
pub const DEFAULT_ANALOG_NOTE_SCALE: f32 = 6.144 / (5.0 * 256.0);

/// Sizing and polarity of a control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub switch_capacity: usize,
    pub coder_capacity: usize,
    /// Level treated as "pressed". `None` lets the input backend decide
    /// (pull-up wiring reads low when pressed).
    pub pressed_level: Option<bool>,
    /// Multiplier from a raw analog sample to a MIDI note number.
    pub analog_note_scale: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            switch_capacity: 36,
            coder_capacity: 4,
            pressed_level: None,
            analog_note_scale: DEFAULT_ANALOG_NOTE_SCALE,
        }
    }
}

impl SurfaceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.switch_capacity > MAX_SLOTS {
            return Err(Error::InvalidConfig(format!(
                "switch_capacity {} exceeds {}",
                self.switch_capacity, MAX_SLOTS
            )));
        }
        if self.coder_capacity > MAX_SLOTS {
            return Err(Error::InvalidConfig(format!(
                "coder_capacity {} exceeds {}",
                self.coder_capacity, MAX_SLOTS
            )));
        }
        if !self.analog_note_scale.is_finite() || self.analog_note_scale < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "analog_note_scale {} must be finite and non-negative",
                self.analog_note_scale
            )));
        }
        Ok(())
    }
}
