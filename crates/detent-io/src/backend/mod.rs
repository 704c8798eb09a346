//! Input acquisition strategies.
//!
//! A backend owns no slot state. It turns a physical change into a slot index
//! plus pin level(s) and calls the registries' delivery entry points.

mod expander;
mod gpio;
mod serial;

pub use expander::{ExpanderInterruptBackend, ExpanderLayout, ExpanderPollBackend, DEFAULT_POLL_INTERVAL};
pub use gpio::GpioBackend;
pub use serial::{SerialBackend, SerialLayout, SerialStats};

use crate::Result;
use detent_core::{CoderPins, CoderRegistry, PinId, SwitchRegistry};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Gpio,
    ExpanderInterrupt,
    ExpanderPoll,
    Serial,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Gpio => "gpio",
            BackendKind::ExpanderInterrupt => "expander-interrupt",
            BackendKind::ExpanderPoll => "expander-poll",
            BackendKind::Serial => "serial",
        };
        f.write_str(name)
    }
}

/// The registries a running backend delivers into.
#[derive(Clone)]
pub struct Registries {
    pub switches: Arc<SwitchRegistry>,
    pub coders: Arc<CoderRegistry>,
}

impl Registries {
    pub fn new(switches: Arc<SwitchRegistry>, coders: Arc<CoderRegistry>) -> Self {
        Self { switches, coders }
    }
}

/// Runtime-selected acquisition mechanism. One is active per surface.
pub trait InputBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Level a pressed switch reads on this wiring.
    fn default_pressed_level(&self) -> bool;

    /// Bring acquisition up and attach every slot already enabled in
    /// `registries`.
    fn start(&mut self, registries: Registries) -> Result<()>;

    /// Tear acquisition down; background tasks are joined. Idempotent.
    fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Called after a switch slot was (re)registered. No-op while stopped.
    fn attach_switch(&mut self, index: usize, pin: PinId) -> Result<()>;

    /// Called after a coder slot was (re)registered. No-op while stopped.
    fn attach_coder(&mut self, index: usize, pins: CoderPins) -> Result<()>;
}

/// Bit `pin` of a little-endian packed bit field; missing bytes read 0.
#[inline]
pub(crate) fn payload_bit(data: &[u8], pin: u16) -> bool {
    data.get(pin as usize / 8)
        .is_some_and(|byte| (byte >> (pin % 8)) & 1 == 1)
}
