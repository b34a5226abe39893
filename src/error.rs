//! Error types for the simulation core.

use thiserror::Error;

/// Errors raised by the simulator and its input validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BacktestError {
    /// Empty series, missing fields or invalid parameter values
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Series out of time order or carrying impossible OHLC values
    #[error("data integrity error: {0}")]
    DataIntegrity(String),
}

impl BacktestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, BacktestError>;
