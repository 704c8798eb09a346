//! # detent - Control-surface input decoding
//!
//! Turns push switches and quadrature rotary encoders into MIDI and OSC
//! control events.
//!
//! ## Architecture
//!
//! detent is an umbrella crate that coordinates:
//! - **detent-core** - Slot registries (debounce, quadrature decode, acceleration), event sink
//! - **detent-io** - Input backends (direct GPIO, port expander, framed serial) and driver traits
//!
//! ## Quick Start
//!
//! ```ignore
//! use detent::prelude::*;
//!
//! let mut sink = ChannelSink::new();
//! let events = sink.subscribe();
//!
//! let surface = Surface::builder()
//!     .switches(36)
//!     .coders(4)
//!     .sink(Arc::new(sink))
//!     .backend(ExpanderPollBackend::new(expander, ExpanderLayout::default()))
//!     .build()?;
//!
//! surface.register_coder(0, CoderPins::new(102, 103), CoderTarget::midi(0, 7), 100, 127, 0)?;
//! surface.start()?;
//!
//! for event in events.iter() {
//!     println!("{event:?}");
//! }
//! ```

/// Re-export of detent-core for direct access
pub use detent_core as core;

/// Re-export of detent-io for direct access
pub use detent_io as io;

pub use detent_core::{
    // Slot registries
    step_increment,
    // Sinks
    ChannelSink,
    // Time
    Clock,
    CoderPins,
    CoderRegistry,
    // Actions and targets
    CoderTarget,
    ControlEvent,
    EventSink,
    ManualClock,
    MonotonicClock,
    Motion,
    NullSink,
    OscAddress,
    OscTarget,
    PinId,
    SlotHandle,
    // Configuration
    SurfaceConfig,
    SwitchAction,
    SwitchRegistry,
    DEBOUNCE_US,
    TICKS_PER_RETENT,
};

pub use detent_core::{AnalogInput, SharedAnalogInput};

pub use detent_io::{
    BackendKind, ByteSource, ExpanderInterruptBackend, ExpanderLayout, ExpanderPollBackend,
    GpioBackend, GpioDriver, InputBackend, PortExpander, ReadSource, SerialBackend, SerialLayout,
    SerialStats,
};

mod builder;
mod error;
mod surface;

pub use builder::SurfaceBuilder;
pub use error::{Error, Result};
pub use surface::Surface;

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Surface, SurfaceBuilder};

    pub use crate::core::{
        ChannelSink, CoderPins, CoderTarget, ControlEvent, EventSink, OscTarget, PinId,
        SwitchAction,
    };

    pub use crate::io::{
        ExpanderInterruptBackend, ExpanderLayout, ExpanderPollBackend, GpioBackend,
        InputBackend, SerialBackend, SerialLayout,
    };

    pub use std::sync::Arc;
}
