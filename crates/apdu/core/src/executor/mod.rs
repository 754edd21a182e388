//! Executor for APDU command execution
//!
//! This module provides executors that combine card transports with
//! command processors to handle APDU command execution.

use core::fmt;
use tracing::{debug, instrument, trace};

use crate::command::Command;
use crate::processor::{CommandProcessor, SecurityLevel};
use crate::response::Response;
use crate::transport::CardTransport;
use crate::Result;

/// Trait for APDU command execution
pub trait Executor: Send + Sync + fmt::Debug {
    /// Transmit an APDU command
    ///
    /// This method handles protocol details including routing through
    /// command processors and secure channels if established.
    #[instrument(
        level = "trace",
        skip(self, command),
        fields(executor = std::any::type_name::<Self>(), ins = command.ins)
    )]
    fn transmit(&mut self, command: &Command) -> Result<Response> {
        let response = self.do_transmit(command);
        match &response {
            Ok(response) => {
                trace!(
                    status = %response.status(),
                    payload_len = response.payload().len(),
                    "Received response"
                );
            }
            Err(err) => {
                debug!(error = ?err, "Error during transmission");
            }
        }
        response
    }

    /// Internal implementation of transmit
    fn do_transmit(&mut self, command: &Command) -> Result<Response>;

    /// Whether commands may use the extended length encoding
    fn supports_extended_length(&self) -> bool;

    /// Get current security level
    fn security_level(&self) -> SecurityLevel;

    /// Reset the executor, including the transport
    fn reset(&mut self) -> Result<()>;
}

/// Card executor implementation that combines a transport with optional command processors
#[derive(Debug)]
pub struct CardExecutor<T: CardTransport> {
    /// The transport used for communication
    transport: T,
    /// Command processors chain (last one processes first)
    processors: Vec<Box<dyn CommandProcessor>>,
}

impl<T: CardTransport> CardExecutor<T> {
    /// Create a new card executor with the given transport
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            processors: Vec::new(),
        }
    }

    /// Get a reference to the underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take ownership of the transport and return it
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Add a command processor to the chain
    pub fn add_processor(&mut self, processor: Box<dyn CommandProcessor>) {
        self.processors.push(processor);
    }

    /// Remove all command processors
    pub fn clear_processors(&mut self) {
        self.processors.clear();
    }
}

impl<T: CardTransport> Executor for CardExecutor<T> {
    fn do_transmit(&mut self, command: &Command) -> Result<Response> {
        // The most recently added processor wraps everything below it
        if let Some(processor) = self.processors.last_mut() {
            return Ok(processor.process_command(command, &mut self.transport)?);
        }

        let command_bytes = command.to_bytes()?;
        let response_bytes = self.transport.transmit_raw(&command_bytes)?;
        Ok(Response::from_bytes(&response_bytes)?)
    }

    fn supports_extended_length(&self) -> bool {
        self.transport.supports_extended_length()
    }

    fn security_level(&self) -> SecurityLevel {
        self.processors
            .iter()
            .map(|p| p.security_level())
            .max()
            .unwrap_or_default()
    }

    fn reset(&mut self) -> Result<()> {
        self.transport.reset()?;

        // Processors carry session state bound to the old connection
        self.processors.clear();

        Ok(())
    }
}
