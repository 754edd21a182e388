//! Secure messaging with the keys agreed by PACE
//!
//! Commands get their data encrypted into DO'87', their Le carried in DO'97' and a
//! CMAC over header and data objects in DO'8E'. Responses are checked and unwrapped
//! the other way around. A send sequence counter (SSC) is incremented before each
//! command and before each response, and is mixed into every MAC and IV.

use bytes::{BufMut, Bytes, BytesMut};
use egk_apdu_core::command::CommandError;
use egk_apdu_core::processor::error::ProcessorError;
use egk_apdu_core::{
    CardTransport, Command, CommandProcessor, EXPECTED_LENGTH_WILDCARD_EXTENDED,
    EXPECTED_LENGTH_WILDCARD_SHORT, ExpectedLength, Response, SecurityLevel, StatusWord,
};
use tracing::{trace, warn};

use crate::crypto::{
    BLOCK_SIZE, MAC_LENGTH, calculate_mac, decrypt_data, encrypt_block, encrypt_data, mac_eq, pad,
};
use crate::pace::PaceKey;
use crate::tlv::write_tlv;

/// CLA bits marking a command as protected
const SECURE_MESSAGING_CLA: u8 = 0x0C;

/// First byte of DO'87', ISO 7816 padding used
const PADDING_INDICATOR: u8 = 0x01;

const TAG_PLAIN_DATA: u8 = 0x81;
const TAG_ENCRYPTED_DATA: u8 = 0x87;
const TAG_EXPECTED_LENGTH: u32 = 0x97;
const TAG_STATUS: u8 = 0x99;
const TAG_MAC: u8 = 0x8E;

/// Smallest protected response: DO'99', DO'8E' and the trailer
const MIN_RESPONSE_LENGTH: usize = 12;

const MAX_SHORT_BODY: usize = 255;

/// Command processor wrapping every command in secure messaging
#[derive(Debug)]
pub struct SecureMessaging {
    key: PaceKey,
    ssc: [u8; BLOCK_SIZE],
}

impl SecureMessaging {
    /// Start a channel with a zero send sequence counter
    pub const fn new(key: PaceKey) -> Self {
        Self {
            key,
            ssc: [0; BLOCK_SIZE],
        }
    }

    fn increment_ssc(&mut self) {
        for byte in self.ssc.iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }

    /// IV for the current SSC, `AES-ECB(k_enc, SSC)`
    fn iv(&self) -> [u8; BLOCK_SIZE] {
        encrypt_block(self.key.enc(), &self.ssc)
    }

    /// MAC over `SSC || data`, `data` already padded by the caller
    fn mac(&self, data: &[u8]) -> [u8; MAC_LENGTH] {
        let mut input = Vec::with_capacity(BLOCK_SIZE + data.len());
        input.extend_from_slice(&self.ssc);
        input.extend_from_slice(data);
        calculate_mac(self.key.mac(), &input)
    }

    /// Protect a plain command
    ///
    /// `extended` tells whether the transport accepts extended frames. Without it
    /// the protected frame stays short whenever its body fits.
    pub fn encrypt(
        &mut self,
        command: &Command,
        extended: bool,
    ) -> Result<Command, ProcessorError> {
        if command.class() & SECURE_MESSAGING_CLA == SECURE_MESSAGING_CLA {
            return Err(CommandError::AlreadyProtected(command.class()).into());
        }
        self.increment_ssc();

        let mut header = command.header();
        header[0] |= SECURE_MESSAGING_CLA;

        let mut objects = BytesMut::new();
        if let Some(data) = command.data() {
            let encrypted = encrypt_data(data, self.key.enc(), &self.iv());
            let mut value = Vec::with_capacity(1 + encrypted.len());
            value.push(PADDING_INDICATOR);
            value.extend_from_slice(&encrypted);
            write_tlv(&mut objects, u32::from(TAG_ENCRYPTED_DATA), &value);
        }
        if let Some(le) = command.expected_length() {
            write_tlv(&mut objects, TAG_EXPECTED_LENGTH, &encode_expected_length(le));
        }

        let mut mac_input = header.to_vec();
        pad(&mut mac_input);
        if !objects.is_empty() {
            let mut padded = objects.to_vec();
            pad(&mut padded);
            mac_input.extend_from_slice(&padded);
        }
        let mac = self.mac(&mac_input);
        objects.put_u8(TAG_MAC);
        objects.put_u8(MAC_LENGTH as u8);
        objects.put_slice(&mac);

        let short = command.expected_length().is_none() || !extended;
        let le = if short && objects.len() <= MAX_SHORT_BODY {
            EXPECTED_LENGTH_WILDCARD_SHORT
        } else {
            EXPECTED_LENGTH_WILDCARD_EXTENDED
        };

        trace!(
            ins = format_args!("{:#04x}", header[1]),
            body_len = objects.len(),
            "Protected command"
        );

        Ok(Command::new_with_data(header[0], header[1], header[2], header[3], objects.freeze())
            .with_le(le))
    }

    /// Verify and unwrap a protected response, trailer included
    pub fn decrypt(&mut self, response: &[u8]) -> Result<Response, ProcessorError> {
        if response.len() < MIN_RESPONSE_LENGTH {
            return Err(ProcessorError::Malformed("response too short"));
        }
        self.increment_ssc();

        let objects = ResponseObjects::parse(response)?;

        let mut mac_input = objects.authenticated.to_vec();
        pad(&mut mac_input);
        if !mac_eq(&self.mac(&mac_input), objects.mac) {
            warn!("Secure messaging response MAC did not verify");
            return Err(ProcessorError::MacMismatch);
        }

        let payload = match objects.data {
            Some(ResponseData::Encrypted(value)) => match value.split_first() {
                Some((&PADDING_INDICATOR, ciphertext)) => {
                    decrypt_data(ciphertext, self.key.enc(), &self.iv())
                        .map_err(|_| ProcessorError::Malformed("bad padding in DO'87'"))?
                }
                _ => return Err(ProcessorError::Malformed("missing padding indicator")),
            },
            Some(ResponseData::Plain(value)) => Bytes::copy_from_slice(value),
            None => Bytes::new(),
        };

        Ok(Response::new(payload, objects.status))
    }
}

impl CommandProcessor for SecureMessaging {
    fn do_process_command(
        &mut self,
        command: &Command,
        transport: &mut dyn CardTransport,
    ) -> Result<Response, ProcessorError> {
        let protected = self.encrypt(command, transport.supports_extended_length())?;
        let response = transport.transmit_raw(&protected.to_bytes()?)?;
        self.decrypt(&response)
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::full()
    }
}

/// DO'97' value: one byte up to 256, two bytes above, `00`/`00 00` for the maximum
fn encode_expected_length(le: ExpectedLength) -> Vec<u8> {
    match le {
        EXPECTED_LENGTH_WILDCARD_SHORT => vec![0x00],
        EXPECTED_LENGTH_WILDCARD_EXTENDED => vec![0x00, 0x00],
        le if le < EXPECTED_LENGTH_WILDCARD_SHORT => vec![le as u8],
        le => (le as u16).to_be_bytes().to_vec(),
    }
}

enum ResponseData<'a> {
    Plain(&'a [u8]),
    Encrypted(&'a [u8]),
}

/// Data objects of a protected response
struct ResponseObjects<'a> {
    data: Option<ResponseData<'a>>,
    status: StatusWord,
    mac: &'a [u8],
    /// DO'81'/DO'87' and DO'99' as received
    authenticated: &'a [u8],
}

impl<'a> ResponseObjects<'a> {
    fn parse(response: &'a [u8]) -> Result<Self, ProcessorError> {
        let mut pos = 0;
        let byte_at = |pos: usize| {
            response
                .get(pos)
                .copied()
                .ok_or(ProcessorError::Malformed("truncated data object"))
        };

        let mut data = None;
        let tag = byte_at(pos)?;
        if tag == TAG_PLAIN_DATA || tag == TAG_ENCRYPTED_DATA {
            let mut len = usize::from(byte_at(pos + 1)?);
            pos += 2;
            if len > 0x80 {
                let count = len & 0x0F;
                let bytes = response
                    .get(pos..pos + count)
                    .ok_or(ProcessorError::Malformed("truncated length"))?;
                len = bytes.iter().fold(0, |acc, b| (acc << 8) | usize::from(*b));
                pos += count;
            }
            let value = response
                .get(pos..pos + len)
                .ok_or(ProcessorError::Malformed("truncated data object"))?;
            pos += len;
            data = Some(if tag == TAG_ENCRYPTED_DATA {
                ResponseData::Encrypted(value)
            } else {
                ResponseData::Plain(value)
            });
        }

        if byte_at(pos)? != TAG_STATUS || byte_at(pos + 1)? != 2 {
            return Err(ProcessorError::Malformed("missing DO'99'"));
        }
        let status = StatusWord::new(byte_at(pos + 2)?, byte_at(pos + 3)?);
        pos += 4;
        let authenticated = &response[..pos];

        if byte_at(pos)? != TAG_MAC || byte_at(pos + 1)? != MAC_LENGTH as u8 {
            return Err(ProcessorError::Malformed("missing DO'8E'"));
        }
        pos += 2;
        let mac = response
            .get(pos..pos + MAC_LENGTH)
            .ok_or(ProcessorError::Malformed("truncated DO'8E'"))?;
        pos += MAC_LENGTH;

        if response.len() - pos != 2 {
            return Err(ProcessorError::Malformed("missing trailer"));
        }

        Ok(Self {
            data,
            status,
            mac,
            authenticated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn channel() -> SecureMessaging {
        SecureMessaging::new(PaceKey::new(
            hex!("68406B4162100563D9C901A6154D2901"),
            hex!("73FF268784F72AF833FDC9464049AFC9"),
        ))
    }

    fn protect(command: Command) -> Vec<u8> {
        channel().encrypt(&command, true).unwrap().to_bytes().unwrap().to_vec()
    }

    #[test]
    fn test_encrypt_header_only() {
        let protected = channel()
            .encrypt(&Command::new(0x01, 0x02, 0x03, 0x04), true)
            .unwrap();
        assert_eq!(
            protected.to_bytes().unwrap().as_ref(),
            hex!("0D0203040A8E08D92B4FDDC2BBED8C00")
        );
        assert_eq!(
            channel().encrypt(&protected, true),
            Err(ProcessorError::Command(CommandError::AlreadyProtected(0x0D)))
        );
    }

    #[test]
    fn test_encrypt_expected_length() {
        assert_eq!(
            protect(Command::new_with_le(0x01, 0x02, 0x03, 0x04, 127)),
            hex!("0D02030400000D97017F8E0871D8E0418DAE20F30000")
        );
        assert_eq!(
            protect(Command::new_with_le(0x01, 0x02, 0x03, 0x04, 257)),
            hex!("0D02030400000E970201018E089F3EDDFBB1D3971D0000")
        );
    }

    #[test]
    fn test_encrypt_data() {
        let data = hex!("05060708090A");
        assert_eq!(
            protect(Command::new_with_data(0x01, 0x02, 0x03, 0x04, data.to_vec())),
            hex!("0D0203041D871101496C26D36306679609665A385C54DB378E08E7AAD918F260D8EF00")
        );
        assert_eq!(
            protect(Command::new_with_data(0x01, 0x02, 0x03, 0x04, data.to_vec()).with_le(127)),
            hex!(
                "0D020304000020871101496C26D36306679609665A385C54DB3797017F8E0863D541F262BD445A0000"
            )
        );
    }

    #[test]
    fn test_encrypt_extended_data() {
        let command = Command::new_with_data(0x01, 0x02, 0x03, 0x04, vec![0u8; 256]).with_le(127);
        assert_eq!(
            protect(command),
            hex!(
                "0D02030400012287820111013297D4AA774AB26AF8AD539C0A829BCA4D222D3EE2DB100CF86D"
                "7DB5A1FAC12B7623328DEFE3F6FDD41A993AC917BC17B364C3DD24740079DE60A3D0231A7185"
                "D36A77D37E147025913ADA00CD07736CFDE0DB2E0BB09B75C5773607E54A9D84181ACBC6F772"
                "6762A8BCE324C0B330548114154A13EDDBFF6DCBC3773DCA9A8494404BE4A5654273F9C2B9EB"
                "E1BD615CB39FFD0D3F2A0EEA29AA10B810D53EDB550FB741A68CC6B0BDF928F9EB6BC238416A"
                "ACB4CF3002E865D486CF42D762C86EEBE6A2B25DECE2E88D569854A07D3F146BC134BAF08B6E"
                "DCBEBDFF47EBA6AC7B441A1642B03253B588C49B69ABBEC92BA1723B7260DE8AD6158873141A"
                "FA7C70CFCF125BA1DF77CA48025D049FCEE497017F8E0856332C83EABDF93C0000"
            )
        );
    }

    #[test]
    fn test_encrypt_short_channel() {
        let short = |command: Command| {
            channel().encrypt(&command, false).unwrap().to_bytes().unwrap().to_vec()
        };
        assert_eq!(
            short(Command::new_with_le(0x01, 0x02, 0x03, 0x04, 127)),
            hex!("0D0203040D97017F8E0871D8E0418DAE20F300")
        );
        let data = hex!("05060708090A").to_vec();
        assert_eq!(
            short(Command::new_with_data(0x01, 0x02, 0x03, 0x04, data).with_le(127)),
            hex!("0D02030420871101496C26D36306679609665A385C54DB3797017F8E0863D541F262BD445A00")
        );
    }

    #[test]
    fn test_expected_length_encoding() {
        assert_eq!(encode_expected_length(1), [0x01]);
        assert_eq!(encode_expected_length(255), [0xFF]);
        assert_eq!(encode_expected_length(256), [0x00]);
        assert_eq!(encode_expected_length(257), [0x01, 0x01]);
        assert_eq!(encode_expected_length(65536), [0x00, 0x00]);
    }

    #[test]
    fn test_decrypt_status_only() {
        let response = channel()
            .decrypt(&hex!("990290008E08087631D746F872729000"))
            .unwrap();
        assert!(response.payload().is_empty());
        assert_eq!(response.status(), StatusWord::new(0x90, 0x00));
    }

    #[test]
    fn test_decrypt_data() {
        let response = channel()
            .decrypt(&hex!(
                "871101496C26D36306679609665A385C54DB37990290008E08B7E9ED2A0C89FB3A9000"
            ))
            .unwrap();
        assert_eq!(response.payload().as_ref(), hex!("05060708090A"));
        assert!(response.is_success());
    }

    #[test]
    fn test_decrypt_rejects_malformed() {
        let cases: [&[u8]; 4] = [
            // no DO'99'
            &hex!("871101496C26D36306679609665A385C54DB378E08B7E9ED2A0C89FB3A9000"),
            // no trailer
            &hex!("871101496C26D36306679609665A385C54DB37990290008E08B7E9ED2A0C89FB3A"),
            // no DO'8E'
            &hex!("871101496C26D36306679609665A385C54DB37990290009000"),
            // plain status
            &hex!("9000"),
        ];
        for response in cases {
            assert!(matches!(
                channel().decrypt(response),
                Err(ProcessorError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_decrypt_wrong_mac() {
        assert_eq!(
            channel().decrypt(&hex!(
                "871101496C26D36306679609665A385C54DB37990290008E08A7E9ED2A0C89FB3A9000"
            )),
            Err(ProcessorError::MacMismatch)
        );
    }

    #[test]
    fn test_ssc_carries() {
        let mut channel = channel();
        channel.ssc = [0xFF; BLOCK_SIZE];
        channel.ssc[0] = 0x00;
        channel.increment_ssc();
        let mut expected = [0u8; BLOCK_SIZE];
        expected[0] = 0x01;
        assert_eq!(channel.ssc, expected);
    }
}
