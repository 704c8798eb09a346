//! Error types for detent-core.

use thiserror::Error;

/// Configuration errors raised by the slot registries.
///
/// Runtime delivery paths never produce these; only registration, binding
/// and query calls do.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Slot index {index} out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
