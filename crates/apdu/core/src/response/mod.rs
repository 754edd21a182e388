//! APDU response definitions
//!
//! This module provides the response frame split into payload and status word
//! according to ISO/IEC 7816-4.

pub mod error;
pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

pub use error::ResponseError;
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data, possibly empty
    payload: Bytes,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Create a success response
    pub const fn success(payload: Bytes) -> Self {
        Self {
            payload,
            status: StatusWord::new(0x90, 0x00),
        }
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self, ResponseError> {
        let Some(split) = data.len().checked_sub(2) else {
            return Err(ResponseError::TooShort(data.len()));
        };
        let (payload, sw) = data.split_at(split);
        let status = StatusWord::new(sw[0], sw[1]);

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status,
        })
    }

    /// Get the response payload data
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the response and keep only its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = ResponseError;

    fn try_from(data: &[u8]) -> Result<Self, ResponseError> {
        Self::from_bytes(data)
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        let mut buf = BytesMut::with_capacity(response.payload.len() + 2);
        buf.put_slice(&response.payload);
        buf.put_u8(response.status.sw1);
        buf.put_u8(response.status.sw2);
        buf.freeze()
    }
}
