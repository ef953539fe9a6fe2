//! Error types for droplimit.

use std::time::Duration;

use thiserror::Error;

/// Main error type for droplimit operations.
#[derive(Error, Debug)]
pub enum DroplimitError {
    /// Target rate was zero, negative or not a finite number
    #[error("Invalid target rate {0}: rate must be greater than 0")]
    InvalidRate(f64),

    /// Wake interval of the token generator was zero
    #[error("Invalid wake interval {0:?}: interval must be greater than 0")]
    InvalidWakeInterval(Duration),

    /// Token capacity outside of the supported range
    #[error("Invalid token capacity {requested}: capacity must be between 1 and {max}")]
    InvalidCapacity { requested: usize, max: usize },

    /// A consumer was assembled without a limiter
    #[error("Invalid limiter: no limiter supplied")]
    MissingLimiter,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for droplimit operations.
pub type Result<T> = std::result::Result<T, DroplimitError>;
