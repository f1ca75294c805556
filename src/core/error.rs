// Error handling for the power-quality core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PqError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PqError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Channel length mismatch: voltage has {voltage} samples, current has {current}")]
    ChannelMismatch { voltage: usize, current: usize },

    #[error("Invalid harmonic spectrum: {0}")]
    InvalidSpectrum(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}

impl PqError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        PqError::InvalidInput(msg.into())
    }
}
