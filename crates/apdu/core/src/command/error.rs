//! Error types specific to APDU commands

use thiserror::Error;

use super::ExpectedLength;

/// Error for APDU command encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Data too long for any encoding
    #[error("Data too long: {0} bytes (max 65535)")]
    DataTooLong(usize),

    /// Expected length beyond the extended wildcard
    #[error("Expected length too large: {0} (max 65536)")]
    ExpectedLengthTooLarge(ExpectedLength),

    /// Command already carries secure messaging bits in its class byte
    #[error("Command class {0:#04X} already indicates secure messaging")]
    AlreadyProtected(u8),
}
