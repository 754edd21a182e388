//! Core error type for all APDU operations
//!
//! This module provides a centralized error type used throughout the egk_apdu_core crate.
//! Each layer keeps its own error enum, this type only bundles them so that `?`
//! works across layer boundaries.

use crate::command::error::CommandError;
use crate::processor::error::ProcessorError;
use crate::response::error::ResponseError;
use crate::transport::error::TransportError;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    //
    // Transport related errors
    //
    /// Transport failed or the channel is gone
    #[error(transparent)]
    Transport(#[from] TransportError),

    //
    // Command related errors
    //
    /// Command could not be encoded
    #[error(transparent)]
    Command(#[from] CommandError),

    //
    // Response related errors
    //
    /// Response could not be parsed
    #[error(transparent)]
    Response(#[from] ResponseError),

    //
    // Processor related errors
    //
    /// A command processor (such as secure messaging) failed
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// Result type for APDU operations
pub type Result<T> = std::result::Result<T, Error>;
