//! # Error Types
//!
//! Custom error types for Stimlink using `thiserror`.

use thiserror::Error;

/// Main error type for Stimlink
#[derive(Debug, Error)]
pub enum StimlinkError {
    /// Command frame could not be built from the given input
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial transport errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate device paths could be opened
    #[error("No device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Frame recording errors
    #[error("Recording error: {0}")]
    Recording(#[from] serde_json::Error),
}

/// Result type alias for Stimlink
pub type Result<T> = std::result::Result<T, StimlinkError>;
