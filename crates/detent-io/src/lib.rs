//! Input acquisition for detent control surfaces.
//!
//! Four interchangeable backends feed the core registries:
//!
//! - **GPIO**: one edge handler per host pin ([`GpioBackend`])
//! - **Expander, interrupt**: one interrupt line per 8-bit bank ([`ExpanderInterruptBackend`])
//! - **Expander, polled**: background bank scan every 10 ms ([`ExpanderPollBackend`])
//! - **Serial**: framed bit-field payloads from a microcontroller ([`SerialBackend`])
//!
//! Hardware access goes through the traits in [`driver`], so platform
//! bindings live outside this crate.
//!
//! # Example
//!
//! ```ignore
//! use detent_io::{ExpanderLayout, ExpanderPollBackend, InputBackend, Registries};
//!
//! let mut backend = ExpanderPollBackend::new(expander, ExpanderLayout::default());
//! backend.start(Registries::new(switches, coders))?;
//! ```

// Error types
pub mod error;
pub use error::{Error, Result};

pub mod backend;
pub mod driver;
pub mod frame;
mod worker;

pub use backend::{
    BackendKind, ExpanderInterruptBackend, ExpanderLayout, ExpanderPollBackend, GpioBackend,
    InputBackend, Registries, SerialBackend, SerialLayout, SerialStats, DEFAULT_POLL_INTERVAL,
};
pub use driver::{ByteSource, EdgeHandler, GpioDriver, PortExpander, ReadSource};
pub use frame::{Extract, FrameRing, FRAME_END, FRAME_START};
