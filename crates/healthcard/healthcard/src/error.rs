use egk_apdu_core::command::CommandError;
use egk_apdu_core::processor::error::ProcessorError;
use egk_apdu_core::transport::TransportError;

use crate::status::ResponseStatus;
use crate::tlv::TlvError;

/// Result type for health card operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of the secure channel handshake
///
/// Only the transport, protocol, capability and authentication kinds occur.
pub type HandshakeError = Error;

/// Coarse classification callers use to pick a remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Link lost, timed out, cancelled or card absent
    Transport,
    /// Unexpected status word or malformed card data
    Protocol,
    /// Card does not support the protocol or its parameters
    Capability,
    /// Key agreement or MAC verification failed
    Authentication,
    /// Caller supplied an invalid argument
    InvalidInput,
}

/// Error type for health card operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Transport-related errors, the channel must be discarded
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Card answered outside the allowed set for a command
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Card cannot run the requested protocol
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Cryptographic verification failed
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    /// Rejected before anything was sent
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),
}

impl Error {
    /// Classification of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Capability(_) => ErrorKind::Capability,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Status the card answered with, when the failure was an unexpected status
    pub const fn response_status(&self) -> Option<ResponseStatus> {
        match self {
            Self::Protocol(ProtocolError::UnexpectedStatus { status, .. })
            | Self::Capability(CapabilityError::Rejected(ProtocolError::UnexpectedStatus {
                status,
                ..
            })) => Some(*status),
            _ => None,
        }
    }

    pub(crate) const fn unexpected(command: &'static str, status: ResponseStatus) -> Self {
        Self::Protocol(ProtocolError::UnexpectedStatus { command, status })
    }
}

impl From<egk_apdu_core::Error> for Error {
    fn from(error: egk_apdu_core::Error) -> Self {
        use egk_apdu_core::Error as Core;
        match error {
            Core::Transport(e) | Core::Processor(ProcessorError::Transport(e)) => {
                Self::Transport(e)
            }
            Core::Processor(ProcessorError::MacMismatch) => {
                Self::Authentication(AuthenticationError::SecureMessagingMac)
            }
            Core::Processor(ProcessorError::Malformed(what)) => {
                Self::Protocol(ProtocolError::SecureMessaging(what))
            }
            Core::Command(e) | Core::Processor(ProcessorError::Command(e)) => {
                Self::Protocol(ProtocolError::Encoding(e))
            }
            Core::Response(_) | Core::Processor(ProcessorError::Response(_)) => {
                Self::Protocol(ProtocolError::Malformed("response shorter than a status word"))
            }
        }
    }
}

impl From<TlvError> for Error {
    fn from(error: TlvError) -> Self {
        Self::Protocol(ProtocolError::Tlv(error))
    }
}

/// Card behaved outside the command protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Status not in the allowed set for the command
    #[error("{command} failed: {status}")]
    UnexpectedStatus {
        /// Command that was answered
        command: &'static str,
        /// Mapped status
        status: ResponseStatus,
    },

    /// Tag/length/value structure could not be read
    #[error("Malformed TLV data: {0}")]
    Tlv(#[from] TlvError),

    /// Card data did not have the expected shape
    #[error("Malformed card data: {0}")]
    Malformed(&'static str),

    /// Command could not be encoded for this channel
    #[error(transparent)]
    Encoding(#[from] CommandError),

    /// Protected response was not well formed
    #[error("Malformed secure messaging response: {0}")]
    SecureMessaging(&'static str),

    /// READ BINARY succeeded without returning data
    #[error("Card returned no data at offset {offset}")]
    NoProgress {
        /// Offset of the empty read
        offset: usize,
    },

    /// File continues past the largest addressable offset
    #[error("File exceeds the addressable offset range")]
    FileTooLarge,
}

/// Card cannot run PACE as required
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// Object system version is older than the minimum
    #[error("Unsupported object system version {0:#08x}")]
    UnsupportedVersion(u32),

    /// Version structure lacked the object system version
    #[error("Object system version missing or truncated")]
    MissingVersion,

    /// EF.CardAccess carried no usable PACE entry
    #[error("No supported PACE parameters on the card")]
    MissingPaceInfo,

    /// Standardized domain parameter id outside the Brainpool set
    #[error("Unsupported PACE parameter id {0}")]
    UnsupportedParameterId(u64),

    /// Card refused or mangled the capability exchange
    #[error("Capability exchange failed: {0}")]
    Rejected(#[source] ProtocolError),
}

/// Cryptographic verification failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    /// Card's authentication token did not match
    #[error("Card authentication token mismatch")]
    TokenMismatch,

    /// Decrypted nonce was malformed or zero
    #[error("Invalid encrypted nonce")]
    InvalidNonce,

    /// Received point invalid, mirrored or the agreement degenerated
    #[error("Invalid key agreement: {0}")]
    InvalidKeyAgreement(&'static str),

    /// Card rejected the access number in the final round
    #[error("Card rejected the access number")]
    CardRejectedAccessNumber,

    /// Protected response failed MAC verification
    #[error("Secure messaging MAC mismatch")]
    SecureMessagingMac,
}

#[cfg(test)]
mod tests {
    use super::*;
    use egk_apdu_core::StatusWord;

    #[test]
    fn test_core_error_mapping() {
        let e: Error = egk_apdu_core::Error::Transport(TransportError::Timeout).into();
        assert_eq!(e.kind(), ErrorKind::Transport);

        let e: Error =
            egk_apdu_core::Error::Processor(ProcessorError::Transport(TransportError::Cancelled))
                .into();
        assert_eq!(e, Error::Transport(TransportError::Cancelled));

        let e: Error = egk_apdu_core::Error::Processor(ProcessorError::MacMismatch).into();
        assert_eq!(e.kind(), ErrorKind::Authentication);

        let e: Error =
            egk_apdu_core::Error::Command(CommandError::DataTooLong(70000)).into();
        assert_eq!(e.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_response_status_surfaces() {
        let status = ResponseStatus::Other(StatusWord::new(0x6A, 0x82));
        let e = Error::unexpected("SELECT", status);
        assert_eq!(e.response_status(), Some(status));

        let e = Error::Capability(CapabilityError::Rejected(ProtocolError::UnexpectedStatus {
            command: "MSE",
            status,
        }));
        assert_eq!(e.response_status(), Some(status));
        assert_eq!(Error::InvalidInput("pin").response_status(), None);
    }
}
