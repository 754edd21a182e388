//! Error types for command processors

use crate::{
    command::error::CommandError, response::error::ResponseError, transport::error::TransportError,
};

/// Error type for command processors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// Underlying transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Command could not be encoded
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Invalid response
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Response MAC did not verify
    #[error("Secure messaging MAC mismatch")]
    MacMismatch,

    /// Protected response did not have the expected structure
    #[error("Malformed secure messaging response: {0}")]
    Malformed(&'static str),
}
