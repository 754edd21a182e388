//! Transport traits for APDU communication with cards
//!
//! This module provides abstractions for communicating with smart cards through
//! different transport mechanisms, including the pre-transceive presence poll and
//! cooperative cancellation shared by every transport.

pub mod error;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace, warn};

/// Bounded presence poll performed before every transceive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresencePolicy {
    /// Number of presence checks before giving up, at least one is always made
    pub attempts: u32,
    /// Pause between two checks
    pub interval: Duration,
}

impl PresencePolicy {
    /// Create a new presence policy
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(100))
    }
}

/// Shared flag used to abort a channel from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create a new, untriggered handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the channel this handle belongs to
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw APDU bytes.
/// It has no knowledge of command structure, secure channels, or protocol details.
pub trait CardTransport: Send + Sync + fmt::Debug {
    /// Send raw APDU bytes to card and return response bytes
    ///
    /// Checks for cancellation, then polls for card presence according to
    /// [`CardTransport::presence_policy`] before handing the bytes to
    /// [`CardTransport::do_transmit_raw`]. Only lengths and timings are logged,
    /// frames may carry secrets.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if self.cancel_handle().is_some_and(|h| h.is_cancelled()) {
            debug!("Channel cancelled, tearing down");
            self.close();
            return Err(TransportError::Cancelled);
        }
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        self.wait_for_presence()?;

        let started = Instant::now();
        trace!(command_len = command.len(), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(
                    response_len = response.len(),
                    elapsed = ?started.elapsed(),
                    "Received raw response"
                );
            }
            Err(e) => {
                debug!(
                    error = ?e,
                    elapsed = ?started.elapsed(),
                    "Transport error during transmission"
                );
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Check whether a card is currently in the field or slot
    fn is_card_present(&mut self) -> Result<bool, TransportError>;

    /// Presence poll applied before each transceive
    fn presence_policy(&self) -> PresencePolicy {
        PresencePolicy::default()
    }

    /// Poll for the card until it shows up or the policy is exhausted
    fn wait_for_presence(&mut self) -> Result<(), TransportError> {
        let policy = self.presence_policy();
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            if self.is_card_present()? {
                return Ok(());
            }
            trace!(attempt, "Card not present yet");
            if attempt < attempts {
                thread::sleep(policy.interval);
            }
        }
        warn!(attempts, "Card absent, not sending command");
        Err(TransportError::CardAbsent { attempts })
    }

    /// Whether the connected card accepts extended length APDUs
    fn supports_extended_length(&self) -> bool {
        false
    }

    /// Handle used to cancel this channel, if it supports cancellation
    fn cancel_handle(&self) -> Option<&CancelHandle> {
        None
    }

    /// Tear down the physical session, after which the transport reports
    /// itself disconnected
    fn close(&mut self) {}

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Reset the transport connection
    fn reset(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub(crate) struct MockTransport {
    /// Mock responses to return
    pub(crate) responses: Vec<Bytes>,
    /// Commands that were sent
    pub(crate) commands: Vec<Bytes>,
    /// Whether the transport is connected
    pub(crate) connected: bool,
    /// Presence answers, the last one repeats
    pub(crate) presence: Vec<bool>,
    pub(crate) presence_checks: u32,
    pub(crate) cancel: CancelHandle,
}

#[cfg(test)]
impl MockTransport {
    /// Create a new mock transport with the given responses
    pub(crate) fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            commands: Vec::new(),
            connected: true,
            presence: vec![true],
            presence_checks: 0,
            cancel: CancelHandle::new(),
        }
    }

    /// Create a new mock transport that always returns the given response
    pub(crate) fn with_response(response: Bytes) -> Self {
        Self::new(vec![response])
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.commands.push(Bytes::copy_from_slice(command));

        if self.responses.is_empty() {
            return Err(TransportError::Transmission);
        }

        // Either clone the single response or take the next one
        if self.responses.len() == 1 {
            Ok(self.responses[0].clone())
        } else {
            Ok(self.responses.remove(0))
        }
    }

    fn is_card_present(&mut self) -> Result<bool, TransportError> {
        let index = (self.presence_checks as usize).min(self.presence.len() - 1);
        self.presence_checks += 1;
        Ok(self.presence[index])
    }

    fn presence_policy(&self) -> PresencePolicy {
        PresencePolicy::new(3, Duration::ZERO)
    }

    fn cancel_handle(&self) -> Option<&CancelHandle> {
        Some(&self.cancel)
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        self.commands.clear();
        Ok(())
    }
}
