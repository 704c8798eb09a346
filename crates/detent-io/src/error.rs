//! Error types for the input backends.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hardware init failed: {0}")]
    HardwareInit(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Core(#[from] detent_core::Error),

    #[error("Backend already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;
