//! Configuration options for PC/SC transport

use std::time::Duration;

use egk_apdu_core::PresencePolicy;
use pcsc::{Protocols as PcscProtocols, ShareMode as PcscShareMode};

/// Sharing mode for card connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    Shared,
    /// Direct connection to the reader
    Direct,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
            ShareMode::Direct => Self::Direct,
        }
    }
}

/// Strategy for picking the reader to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStrategy {
    /// Connect to a specific reader by name
    Reader(String),

    /// Connect to the first reader holding a card
    AnyCard,

    /// Connect to the reader whose card ATR matches this pattern
    CardWithAtr(Vec<u8>, Option<Vec<u8>>), // (ATR, mask)

    /// Connect to the first reader, card or not
    FirstAvailable,
}

/// Configuration options for PC/SC transport
#[derive(Debug, Clone)]
pub struct PcscConfig {
    /// Sharing mode for card connections
    pub share_mode: ShareMode,

    /// Preferred protocols for card communication
    pub protocols: PcscProtocols,

    /// Presence poll run before every transceive
    pub presence_policy: PresencePolicy,

    /// How long a single transceive may take before the channel is given up
    pub io_timeout: Duration,

    /// Force extended length support on or off instead of reading it from the ATR
    pub extended_length: Option<bool>,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: PcscProtocols::ANY,
            presence_policy: PresencePolicy::default(),
            io_timeout: Duration::from_secs(5),
            extended_length: None,
        }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Set the preferred protocols
    pub const fn with_protocols(mut self, protocols: PcscProtocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the presence poll
    pub const fn with_presence_policy(mut self, policy: PresencePolicy) -> Self {
        self.presence_policy = policy;
        self
    }

    /// Set the I/O timeout for a single transceive
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Override extended length detection
    pub const fn with_extended_length(mut self, supported: bool) -> Self {
        self.extended_length = Some(supported);
        self
    }
}
