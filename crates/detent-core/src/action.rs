//! What a switch or rotary encoder emits when its state changes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Opaque pin identifier. Its meaning (GPIO line, expander address, bit
/// position in a serial payload) is resolved by the active input backend.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PinId(pub u16);

impl PinId {
    #[inline]
    pub fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for PinId {
    fn from(pin: u16) -> Self {
        Self(pin)
    }
}

/// Event bound to a switch.
///
/// Press/release is decided by the registry's configured pressed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwitchAction {
    #[default]
    None,
    /// Press sends `val`, release sends 0.
    ControlChange { chan: u8, num: u8, val: u8 },
    /// Press sends note-on with velocity `val`, release sends note-off.
    Note { chan: u8, num: u8, val: u8 },
    /// Sent on press only.
    ProgramChange { chan: u8, num: u8 },
    /// Gate input: on press the note number is sampled from analog channel
    /// `channel_index`; the same note is released on release.
    AnalogGateIn {
        chan: u8,
        channel_index: u8,
        velocity: u8,
    },
}

/// Network endpoint of an OSC receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OscAddress {
    pub host: String,
    pub port: u16,
}

impl OscAddress {
    pub fn localhost(port: u16) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
        }
    }
}

/// OSC destination for a rotary encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscTarget {
    pub address: OscAddress,
    pub path: String,
    /// Send `value >= 64` as a boolean instead of the integer value.
    pub boolean_mode: bool,
}

impl OscTarget {
    pub fn new(address: OscAddress, path: impl Into<String>, boolean_mode: bool) -> Self {
        Self {
            address,
            path: path.into(),
            boolean_mode,
        }
    }

    /// Toggle-like encoders (step of 8 or more) are sent as booleans.
    pub fn for_step(address: OscAddress, path: impl Into<String>, step: u32) -> Self {
        Self::new(address, path, step >= 8)
    }

    /// Parse a `"port:path"` binding for a receiver on localhost.
    ///
    /// ```
    /// use detent_core::OscTarget;
    ///
    /// let target = OscTarget::parse("1370:/mixer/volume", false).unwrap();
    /// assert_eq!(target.address.port, 1370);
    /// assert_eq!(target.path, "/mixer/volume");
    /// ```
    pub fn parse(binding: &str, boolean_mode: bool) -> Result<Self> {
        let (port, path) = binding
            .split_once(':')
            .ok_or_else(|| Error::InvalidConfig(format!("OSC binding '{binding}' has no path")))?;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("OSC binding '{binding}' has no port")))?;
        if port == 0 {
            return Err(Error::InvalidConfig(format!(
                "OSC binding '{binding}' uses port 0"
            )));
        }
        if path.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "OSC binding '{binding}' has an empty path"
            )));
        }
        Ok(Self::new(OscAddress::localhost(port), path, boolean_mode))
    }
}

/// Destination of a rotary encoder's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoderTarget {
    Midi { chan: u8, ctrl: u8 },
    Osc(OscTarget),
}

impl CoderTarget {
    /// Out-of-range bindings fall back to channel 0 / controller 1.
    pub fn midi(chan: u8, ctrl: u8) -> Self {
        CoderTarget::Midi {
            chan: if chan > 15 { 0 } else { chan },
            ctrl: if ctrl > 127 { 1 } else { ctrl },
        }
    }

    #[inline]
    pub fn is_midi_cc(&self, chan: u8, ctrl: u8) -> bool {
        matches!(self, CoderTarget::Midi { chan: c, ctrl: n } if *c == chan && *n == ctrl)
    }
}
