//! Commands understood by the health card
//!
//! Every command is a variant of [`HealthCardCommand`]; [`HealthCardCommand::encode`]
//! is the only place that knows how a variant maps to a frame.

pub mod pin;

use bytes::{Bytes, BytesMut};
use egk_apdu_core::{
    Command, EXPECTED_LENGTH_WILDCARD_EXTENDED, EXPECTED_LENGTH_WILDCARD_SHORT, Executor,
    ExpectedLength, Response,
};
use tracing::debug;

pub use pin::{CardKeyReference, EncryptedPinFormat2, PasswordReference};

use crate::error::Error;
use crate::status::ResponseStatus;
use crate::tlv::write_tlv;

const CLA: u8 = 0x00;
const CLA_CHAINING: u8 = 0x10;

const INS_SELECT: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const INS_GET_CHALLENGE: u8 = 0x84;
const INS_VERIFY: u8 = 0x20;
const INS_CHANGE_REFERENCE_DATA: u8 = 0x24;
const INS_RESET_RETRY_COUNTER: u8 = 0x2C;
const INS_MANAGE_SECURITY_ENVIRONMENT: u8 = 0x22;
const INS_GENERAL_AUTHENTICATE: u8 = 0x86;
const INS_PERFORM_SECURITY_OPERATION: u8 = 0x2A;

/// Largest offset READ BINARY can address with P1-P2
pub const MAX_READ_OFFSET: u16 = 0x7FFF;

/// Bits of P1 carrying a short file identifier
const SFI_MASK: u8 = 0x1F;

/// Dynamic authentication data, wraps every GENERAL AUTHENTICATE payload
pub const TAG_DYNAMIC_AUTHENTICATION_DATA: u32 = 0x7C;

/// ECDSA with the hash done outside the card
pub const SIGNATURE_ALGORITHM_ECDSA: u8 = 0x00;

/// Card command as a closed set of kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCardCommand {
    /// SELECT the MF
    SelectRoot,
    /// SELECT a DF by application identifier
    SelectApplication {
        /// Application identifier
        aid: Bytes,
    },
    /// SELECT an EF by file identifier
    SelectFile {
        /// File identifier
        fid: u16,
        /// Ask for the file control parameters
        fcp: bool,
    },
    /// READ BINARY from the current EF
    ReadBinary {
        /// Offset, at most [`MAX_READ_OFFSET`]
        offset: u16,
    },
    /// READ BINARY selecting the EF by short file identifier
    ReadBinarySfi {
        /// Short file identifier
        sfi: u8,
        /// Offset, at most 255
        offset: u8,
    },
    /// GET CHALLENGE
    GetRandom {
        /// Number of random bytes, 1 to 256
        length: u16,
    },
    /// VERIFY a password
    Verify {
        /// Password object
        password: PasswordReference,
        /// PIN block
        pin: EncryptedPinFormat2,
    },
    /// CHANGE REFERENCE DATA with old and new secret
    ChangeReferenceData {
        /// Password object
        password: PasswordReference,
        /// Current secret
        old: EncryptedPinFormat2,
        /// New secret
        new: EncryptedPinFormat2,
    },
    /// RESET RETRY COUNTER with the PUK, optionally setting a new secret
    ResetRetryCounter {
        /// Password object
        password: PasswordReference,
        /// Unblocking key
        puk: EncryptedPinFormat2,
        /// Replacement secret
        new: Option<EncryptedPinFormat2>,
    },
    /// MANAGE SECURITY ENVIRONMENT: SET for mutual authentication
    MseSetAuthentication {
        /// Protocol object identifier, content octets
        protocol_id: Bytes,
        /// Password used by the protocol
        password: PasswordReference,
    },
    /// MANAGE SECURITY ENVIRONMENT: SET for computing a signature
    MseSetSignature {
        /// Private key
        key: CardKeyReference,
        /// Algorithm identifier
        algorithm: u8,
    },
    /// GENERAL AUTHENTICATE
    GeneralAuthenticate {
        /// More rounds follow
        chained: bool,
        /// Data objects placed inside the `7C` wrapper
        data: Bytes,
    },
    /// PERFORM SECURITY OPERATION: COMPUTE DIGITAL SIGNATURE
    PsoComputeDigitalSignature {
        /// Data to be signed
        data: Bytes,
    },
}

impl HealthCardCommand {
    /// READ BINARY at an offset, rejecting offsets P1-P2 cannot carry
    pub fn read_binary(offset: usize) -> Result<Self, Error> {
        match u16::try_from(offset) {
            Ok(offset) if offset <= MAX_READ_OFFSET => Ok(Self::ReadBinary { offset }),
            _ => Err(Error::InvalidInput("read offset beyond 0x7FFF")),
        }
    }

    /// GET CHALLENGE for `length` bytes
    pub fn get_random(length: usize) -> Result<Self, Error> {
        match u16::try_from(length) {
            Ok(length @ 1..=256) => Ok(Self::GetRandom { length }),
            _ => Err(Error::InvalidInput("random length must be between 1 and 256")),
        }
    }

    /// GENERAL AUTHENTICATE carrying a single data object
    pub fn general_authenticate(chained: bool, tag: u32, value: &[u8]) -> Self {
        let mut data = BytesMut::new();
        write_tlv(&mut data, tag, value);
        Self::GeneralAuthenticate {
            chained,
            data: data.freeze(),
        }
    }

    /// Short name for logs and errors
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SelectRoot => "SELECT MF",
            Self::SelectApplication { .. } => "SELECT DF",
            Self::SelectFile { .. } => "SELECT EF",
            Self::ReadBinary { .. } | Self::ReadBinarySfi { .. } => "READ BINARY",
            Self::GetRandom { .. } => "GET CHALLENGE",
            Self::Verify { .. } => "VERIFY",
            Self::ChangeReferenceData { .. } => "CHANGE REFERENCE DATA",
            Self::ResetRetryCounter { .. } => "RESET RETRY COUNTER",
            Self::MseSetAuthentication { .. } | Self::MseSetSignature { .. } => {
                "MANAGE SECURITY ENVIRONMENT"
            }
            Self::GeneralAuthenticate { .. } => "GENERAL AUTHENTICATE",
            Self::PsoComputeDigitalSignature { .. } => "PSO: COMPUTE DIGITAL SIGNATURE",
        }
    }

    /// Build the frame for this command
    ///
    /// `extended` tells whether the channel accepts extended length; it decides the
    /// wildcard used for Le.
    pub fn encode(&self, extended: bool) -> Command {
        let wildcard: ExpectedLength = if extended {
            EXPECTED_LENGTH_WILDCARD_EXTENDED
        } else {
            EXPECTED_LENGTH_WILDCARD_SHORT
        };

        match self {
            Self::SelectRoot => Command::new(CLA, INS_SELECT, 0x04, 0x0C),
            Self::SelectApplication { aid } => {
                Command::new_with_data(CLA, INS_SELECT, 0x04, 0x0C, aid.clone())
            }
            Self::SelectFile { fid, fcp } => {
                let command = Command::new_with_data(
                    CLA,
                    INS_SELECT,
                    0x02,
                    if *fcp { 0x04 } else { 0x0C },
                    fid.to_be_bytes().to_vec(),
                );
                if *fcp { command.with_le(wildcard) } else { command }
            }
            Self::ReadBinary { offset } => {
                let [p1, p2] = (offset & MAX_READ_OFFSET).to_be_bytes();
                Command::new_with_le(CLA, INS_READ_BINARY, p1, p2, wildcard)
            }
            Self::ReadBinarySfi { sfi, offset } => Command::new_with_le(
                CLA,
                INS_READ_BINARY,
                0x80 | (sfi & SFI_MASK),
                *offset,
                wildcard,
            ),
            Self::GetRandom { length } => Command::new_with_le(
                CLA,
                INS_GET_CHALLENGE,
                0x00,
                0x00,
                ExpectedLength::from(*length),
            ),
            Self::Verify { password, pin } => Command::new_with_data(
                CLA,
                INS_VERIFY,
                0x00,
                password.to_byte(),
                pin.as_bytes().to_vec(),
            ),
            Self::ChangeReferenceData { password, old, new } => {
                let mut data = Vec::with_capacity(2 * EncryptedPinFormat2::LENGTH);
                data.extend_from_slice(old.as_bytes());
                data.extend_from_slice(new.as_bytes());
                Command::new_with_data(
                    CLA,
                    INS_CHANGE_REFERENCE_DATA,
                    0x00,
                    password.to_byte(),
                    data,
                )
            }
            Self::ResetRetryCounter { password, puk, new } => {
                let mut data = puk.as_bytes().to_vec();
                let p1 = match new {
                    Some(new) => {
                        data.extend_from_slice(new.as_bytes());
                        0x00
                    }
                    None => 0x01,
                };
                Command::new_with_data(CLA, INS_RESET_RETRY_COUNTER, p1, password.to_byte(), data)
            }
            Self::MseSetAuthentication {
                protocol_id,
                password,
            } => {
                let mut data = BytesMut::new();
                write_tlv(&mut data, 0x80, protocol_id);
                write_tlv(&mut data, 0x83, &[password.to_byte()]);
                Command::new_with_data(
                    CLA,
                    INS_MANAGE_SECURITY_ENVIRONMENT,
                    0xC1,
                    0xA4,
                    data.freeze(),
                )
            }
            Self::MseSetSignature { key, algorithm } => {
                let mut data = BytesMut::new();
                write_tlv(&mut data, 0x84, &[key.to_byte()]);
                write_tlv(&mut data, 0x80, &[*algorithm]);
                Command::new_with_data(
                    CLA,
                    INS_MANAGE_SECURITY_ENVIRONMENT,
                    0x41,
                    0xB6,
                    data.freeze(),
                )
            }
            Self::GeneralAuthenticate { chained, data } => {
                let mut wrapped = BytesMut::new();
                write_tlv(&mut wrapped, TAG_DYNAMIC_AUTHENTICATION_DATA, data);
                Command::new_with_data(
                    if *chained { CLA_CHAINING } else { CLA },
                    INS_GENERAL_AUTHENTICATE,
                    0x00,
                    0x00,
                    wrapped.freeze(),
                )
                .with_le(wildcard)
            }
            Self::PsoComputeDigitalSignature { data } => Command::new_with_data(
                CLA,
                INS_PERFORM_SECURITY_OPERATION,
                0x9E,
                0x9A,
                data.clone(),
            )
            .with_le(wildcard),
        }
    }
}

/// Sending [`HealthCardCommand`]s through an executor
pub trait HealthCardExecutor {
    /// Encode for the executor's length capability and transmit
    fn send(&mut self, command: &HealthCardCommand) -> Result<Response, Error>;

    /// Transmit and fail unless the card answered with success
    fn send_expecting_success(&mut self, command: &HealthCardCommand) -> Result<Response, Error> {
        let response = self.send(command)?;
        match ResponseStatus::from(&response) {
            ResponseStatus::Success => Ok(response),
            status => {
                debug!(command = command.name(), %status, "Unexpected status");
                Err(Error::unexpected(command.name(), status))
            }
        }
    }

    /// Transmit a READ BINARY that reads a whole file at once
    ///
    /// A file shorter than Le comes back complete with 62 82, which counts as success.
    fn read_expecting_content(&mut self, command: &HealthCardCommand) -> Result<Response, Error> {
        let response = self.send(command)?;
        match ResponseStatus::from(&response) {
            ResponseStatus::Success | ResponseStatus::EndOfFileWarning => Ok(response),
            status => {
                debug!(command = command.name(), %status, "Unexpected status");
                Err(Error::unexpected(command.name(), status))
            }
        }
    }
}

impl<E: Executor + ?Sized> HealthCardExecutor for E {
    fn send(&mut self, command: &HealthCardCommand) -> Result<Response, Error> {
        let extended = self.supports_extended_length();
        Ok(self.transmit(&command.encode(extended))?)
    }
}
