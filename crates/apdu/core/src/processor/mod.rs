//! Command processors for APDU transformations
//!
//! This module provides abstractions for processing APDU commands before
//! sending them to a card transport. Command processors can implement
//! transformations such as secure messaging.

pub mod error;

use core::fmt;
use tracing::{debug, trace};

use crate::command::Command;
use crate::response::Response;
use crate::transport::CardTransport;
use error::ProcessorError;

/// Protection applied to commands by a processor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecurityLevel {
    /// Commands and responses are authenticated
    pub mac: bool,
    /// Command and response data are encrypted
    pub encrypted: bool,
}

impl SecurityLevel {
    /// No protection
    pub const fn none() -> Self {
        Self {
            mac: false,
            encrypted: false,
        }
    }

    /// Authenticated and encrypted
    pub const fn full() -> Self {
        Self {
            mac: true,
            encrypted: true,
        }
    }
}

/// Trait for command processors which transform commands
/// before sending them to the transport
pub trait CommandProcessor: Send + Sync + fmt::Debug {
    /// Process a command through this processor
    ///
    /// This method takes a command, potentially transforms it, sends it through
    /// the transport, and potentially transforms the response.
    fn process_command(
        &mut self,
        command: &Command,
        transport: &mut dyn CardTransport,
    ) -> Result<Response, ProcessorError> {
        trace!(
            ins = format_args!("{:#04x}", command.ins),
            processor = std::any::type_name::<Self>(),
            "Processing command"
        );

        let result = self.do_process_command(command, transport);

        match &result {
            Ok(response) => {
                trace!(status = %response.status(), "Processed response");
            }
            Err(e) => {
                debug!(error = ?e, "Error during command processing");
            }
        }

        result
    }

    /// Internal implementation of process_command
    fn do_process_command(
        &mut self,
        command: &Command,
        transport: &mut dyn CardTransport,
    ) -> Result<Response, ProcessorError>;

    /// Get the security level provided by this processor
    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::none()
    }
}

/// Identity processor that doesn't modify commands
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProcessor;

impl CommandProcessor for IdentityProcessor {
    fn do_process_command(
        &mut self,
        command: &Command,
        transport: &mut dyn CardTransport,
    ) -> Result<Response, ProcessorError> {
        let command_bytes = command.to_bytes()?;
        let response_bytes = transport.transmit_raw(&command_bytes)?;
        Ok(Response::from_bytes(&response_bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use bytes::Bytes;

    #[test]
    fn test_identity_processor() {
        let mut transport = MockTransport::with_response(Bytes::from_static(&[0x90, 0x00]));
        let mut processor = IdentityProcessor;

        let command = Command::new(0x00, 0xA4, 0x04, 0x0C);
        let response = processor.process_command(&command, &mut transport).unwrap();

        assert_eq!(response.status().to_u16(), 0x9000);
        assert_eq!(transport.commands[0], command.to_bytes().unwrap());
    }

    #[test]
    fn test_identity_processor_short_response() {
        let mut transport = MockTransport::with_response(Bytes::from_static(&[0x90]));
        let err = IdentityProcessor
            .process_command(&Command::new(0x00, 0xA4, 0x04, 0x0C), &mut transport)
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Response(_)));
    }
}
