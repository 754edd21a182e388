//! Error types specific to card transport

use thiserror::Error;

/// Transport error type
///
/// Any of these leaves the channel unusable; callers open a new one instead of
/// retrying on the same transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to device")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Device error
    #[error("Device error")]
    Device,

    /// Driver error (with code)
    #[error("Driver error code: {0}")]
    Driver(i32),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled operation
    #[error("Operation cancelled")]
    Cancelled,

    /// No card was seen within the presence poll window
    #[error("Card absent after {attempts} presence polls")]
    CardAbsent {
        /// Number of polls performed
        attempts: u32,
    },

    /// Card was removed or reset while the channel was open
    #[error("Card removed")]
    CardRemoved,

    /// Channel was invalidated by an earlier failure
    #[error("Channel closed after a previous failure")]
    Closed,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a new driver error
    pub const fn driver(code: i32) -> Self {
        Self::Driver(code)
    }

    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}
