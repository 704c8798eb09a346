//! Centralized error type for the detent umbrella crate.
//!
//! Wraps the subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] detent_core::Error),

    #[error("Input: {0}")]
    Input(#[from] detent_io::Error),

    #[error("No input backend configured")]
    NoBackend,
}

pub type Result<T> = std::result::Result<T, Error>;
