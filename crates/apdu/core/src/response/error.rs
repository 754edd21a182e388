//! Error types specific to APDU responses

use thiserror::Error;

/// Error for APDU response parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// Response shorter than the two status bytes
    #[error("Response too short: {0} bytes")]
    TooShort(usize),
}
