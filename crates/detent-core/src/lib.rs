//! Control-surface core for detent.
//!
//! Fixed-capacity registries of push switches and rotary encoders. Hardware
//! backends feed pin levels in; the registries debounce, decode and emit
//! MIDI or OSC events through an [`EventSink`].
//!
//! # Example
//!
//! ```ignore
//! use detent_core::{ChannelSink, CoderPins, CoderRegistry, CoderTarget, MonotonicClock};
//! use std::sync::Arc;
//!
//! let mut sink = ChannelSink::new();
//! let events = sink.subscribe();
//! let coders = CoderRegistry::new(4, Arc::new(sink), Arc::new(MonotonicClock::new()));
//!
//! coders.register(0, CoderPins::new(20, 21), CoderTarget::midi(0, 74), 64, 127, 0)?;
//! coders.deliver_coder_transition(0, true, false);
//! ```

// Error types
pub mod error;
pub use error::{Error, Result};

mod action;
mod clock;
mod config;
mod sink;
mod slot;

pub mod coder;
pub mod switch;

pub use action::{CoderTarget, OscAddress, OscTarget, PinId, SwitchAction};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{SurfaceConfig, DEFAULT_ANALOG_NOTE_SCALE, MAX_SLOTS};
pub use sink::{ChannelSink, ControlEvent, EventSink, NullSink};
pub use slot::{SlotHandle, DEBOUNCE_US};

pub use coder::{step_increment, CoderPins, CoderRegistry, Motion, TICKS_PER_RETENT};
pub use switch::{scale_to_note, AnalogInput, SharedAnalogInput, SwitchRegistry};
