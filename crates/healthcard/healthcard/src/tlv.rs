//! Minimal BER-TLV reader and writer
//!
//! Covers the handful of structures the card exchanges: multi-byte tags,
//! definite lengths up to three bytes, no indefinite form.

use bytes::{BufMut, BytesMut};

/// Error while walking a TLV structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    /// Input ended inside a tag, length or value
    #[error("truncated TLV")]
    Truncated,
    /// Length form not supported
    #[error("unsupported length encoding {0:#04x}")]
    UnsupportedLength(u8),
    /// Tag longer than four bytes
    #[error("tag too long")]
    TagTooLong,
    /// Required tag not present
    #[error("missing tag {0:#x}")]
    MissingTag(u32),
}

/// One decoded data object borrowing its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Tag including class and constructed bits
    pub tag: u32,
    /// Value bytes
    pub value: &'a [u8],
}

/// Iterator over consecutive data objects
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    data: &'a [u8],
}

impl<'a> TlvReader<'a> {
    /// Read objects from `data`
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// First object carrying `tag`
    pub fn find(data: &'a [u8], tag: u32) -> Result<Tlv<'a>, TlvError> {
        for tlv in Self::new(data) {
            let tlv = tlv?;
            if tlv.tag == tag {
                return Ok(tlv);
            }
        }
        Err(TlvError::MissingTag(tag))
    }

    /// Value of the only object expected in `data`, which must carry `tag`
    pub fn expect(data: &'a [u8], tag: u32) -> Result<&'a [u8], TlvError> {
        let (tlv, _) = read_one(data)?;
        if tlv.tag == tag {
            Ok(tlv.value)
        } else {
            Err(TlvError::MissingTag(tag))
        }
    }

    /// Bytes not consumed yet
    pub const fn remaining(&self) -> &'a [u8] {
        self.data
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = Result<Tlv<'a>, TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        match read_one(self.data) {
            Ok((tlv, rest)) => {
                self.data = rest;
                Some(Ok(tlv))
            }
            Err(e) => {
                self.data = &[];
                Some(Err(e))
            }
        }
    }
}

fn read_one(data: &[u8]) -> Result<(Tlv<'_>, &[u8]), TlvError> {
    let (&first, mut rest) = data.split_first().ok_or(TlvError::Truncated)?;
    let mut tag = u32::from(first);
    if first & 0x1F == 0x1F {
        // Subsequent bytes continue while b8 is set
        let mut count = 1;
        loop {
            let (&b, r) = rest.split_first().ok_or(TlvError::Truncated)?;
            rest = r;
            count += 1;
            if count > 4 {
                return Err(TlvError::TagTooLong);
            }
            tag = (tag << 8) | u32::from(b);
            if b & 0x80 == 0 {
                break;
            }
        }
    }

    let (&len_byte, r) = rest.split_first().ok_or(TlvError::Truncated)?;
    rest = r;
    let len = match len_byte {
        0x00..=0x7F => usize::from(len_byte),
        0x81..=0x83 => {
            let n = usize::from(len_byte & 0x0F);
            if rest.len() < n {
                return Err(TlvError::Truncated);
            }
            let (len_bytes, r) = rest.split_at(n);
            rest = r;
            len_bytes.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b))
        }
        other => return Err(TlvError::UnsupportedLength(other)),
    };

    if rest.len() < len {
        return Err(TlvError::Truncated);
    }
    let (value, rest) = rest.split_at(len);
    Ok((Tlv { tag, value }, rest))
}

/// Append a data object with a definite length
pub fn write_tlv(buf: &mut BytesMut, tag: u32, value: &[u8]) {
    let tag_bytes = tag.to_be_bytes();
    let skip = tag_bytes.iter().take(3).take_while(|&&b| b == 0).count();
    buf.put_slice(&tag_bytes[skip..]);

    let len = value.len();
    if len < 0x80 {
        buf.put_u8(len as u8);
    } else if len <= 0xFF {
        buf.put_u8(0x81);
        buf.put_u8(len as u8);
    } else if len <= 0xFFFF {
        buf.put_u8(0x82);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(0x83);
        buf.put_slice(&(len as u32).to_be_bytes()[1..]);
    }
    buf.put_slice(value);
}

/// Encode a data object into a fresh buffer
pub fn tlv(tag: u32, value: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(value.len() + 6);
    write_tlv(&mut buf, tag, value);
    buf
}
