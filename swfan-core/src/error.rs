//! Error types for the swfan system

use thiserror::Error;

/// Core error type for swfan operations
#[derive(Error, Debug)]
pub enum FanError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device read/write failures
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No device path or target is known for a logical channel
    #[error("No device mapping for channel {0}")]
    UnknownChannel(String),

    /// Board type not recognised or not supported by the daemon
    #[error("Unsupported board: {0}")]
    UnsupportedBoard(String),

    /// Fan slot out of range for the array it was addressed on
    #[error("Fan slot out of range: {slot} (array has {fans} fans)")]
    InvalidFanSlot { slot: usize, fans: usize },

    /// Watchdog device errors
    #[error("Watchdog error: {0}")]
    Watchdog(String),

    /// Parsing errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type alias for swfan operations
pub type Result<T> = std::result::Result<T, FanError>;

impl From<toml::de::Error> for FanError {
    fn from(err: toml::de::Error) -> Self {
        FanError::Config(err.to_string())
    }
}
