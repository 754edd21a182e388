//! APDU command definitions
//!
//! This module provides the command frame and its ISO/IEC 7816-4 serialisation,
//! choosing between the short and the extended length encoding.

pub mod error;

use bytes::{BufMut, Bytes, BytesMut};

pub use error::CommandError;

/// Expected length type for APDU commands
///
/// Values are the number of bytes the card may return, so `256` and `65536`
/// are valid and mean "as many as fit" in the short and extended encodings.
pub type ExpectedLength = u32;

/// Le value asking for up to 256 bytes (encoded as `00`)
pub const EXPECTED_LENGTH_WILDCARD_SHORT: ExpectedLength = 256;

/// Le value asking for up to 65536 bytes (encoded as `00 00`)
pub const EXPECTED_LENGTH_WILDCARD_EXTENDED: ExpectedLength = 65536;

const MAX_SHORT_DATA: usize = 255;
const MAX_EXTENDED_DATA: usize = 65535;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Command class (CLA)
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command payload data, empty slices are treated as absent
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref().filter(|d| !d.is_empty())
    }

    /// Expected response length
    pub const fn expected_length(&self) -> Option<ExpectedLength> {
        self.le
    }

    /// Header bytes CLA INS P1 P2
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Whether this command needs the extended length encoding
    pub fn is_extended(&self) -> bool {
        self.data().is_some_and(|d| d.len() > MAX_SHORT_DATA)
            || self.le.is_some_and(|le| le > EXPECTED_LENGTH_WILDCARD_SHORT)
    }

    /// Convert to raw APDU bytes
    ///
    /// The short encoding is used whenever both the data and the expected length
    /// fit it. Otherwise both Lc and Le use the extended encoding, as ISO/IEC 7816-4
    /// forbids mixing the two forms within one command.
    pub fn to_bytes(&self) -> Result<Bytes, CommandError> {
        let data = self.data();
        if let Some(d) = data {
            if d.len() > MAX_EXTENDED_DATA {
                return Err(CommandError::DataTooLong(d.len()));
            }
        }
        if let Some(le) = self.le {
            if le > EXPECTED_LENGTH_WILDCARD_EXTENDED {
                return Err(CommandError::ExpectedLengthTooLarge(le));
            }
        }

        let extended = self.is_extended();
        let mut buffer = BytesMut::with_capacity(4 + 3 + data.map_or(0, <[u8]>::len) + 3);

        // Header: CLA, INS, P1, P2
        buffer.put_slice(&self.header());

        // Add Lc and data if present
        if let Some(d) = data {
            if extended {
                buffer.put_u8(0x00);
                buffer.put_u16(d.len() as u16);
            } else {
                buffer.put_u8(d.len() as u8);
            }
            buffer.put_slice(d);
        }

        // Add Le if present
        if let Some(le) = self.le {
            if extended {
                if data.is_none() {
                    buffer.put_u8(0x00);
                }
                // 65536 wraps to 00 00
                buffer.put_u16(le as u16);
            } else {
                // 256 wraps to 00
                buffer.put_u8(le as u8);
            }
        }

        Ok(buffer.freeze())
    }
}
