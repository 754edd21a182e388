//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for working with smart card
//! APDU commands and responses according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! - [`Command`] frames with short and extended length encoding
//! - [`Response`] parsing into payload and [`StatusWord`]
//! - [`CardTransport`] with a bounded presence poll and cooperative cancellation
//! - [`CommandProcessor`] layering for secure messaging
//! - [`CardExecutor`] tying a transport to its processor chain
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

// Main modules
pub mod command;
pub mod executor;
pub mod processor;
pub mod response;
pub mod transport;

// Core error types
mod error;
pub use error::{Error, Result};

// Re-exports for common types
pub use command::{
    Command, EXPECTED_LENGTH_WILDCARD_EXTENDED, EXPECTED_LENGTH_WILDCARD_SHORT, ExpectedLength,
};
pub use executor::{CardExecutor, Executor};
pub use processor::{CommandProcessor, SecurityLevel};
pub use response::Response;
pub use response::status::StatusWord;
pub use transport::{CancelHandle, CardTransport, PresencePolicy, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, CancelHandle, CardExecutor, CardTransport, Command, CommandProcessor,
        Error, Executor, PresencePolicy, Response, Result, SecurityLevel, StatusWord,
        TransportError,
    };
}
