//! Scripted card for integration tests
//!
//! [`FakeCard`] plays the card side of PACE with the same curve arithmetic as the
//! host, serves files and answers the PIN, random and signature commands from
//! configurable statuses. Once PACE completes it unwraps protected commands and
//! protects its answers with the agreed keys. Every transmitted frame is counted
//! and recorded.

#![allow(dead_code, unreachable_pub, missing_docs)]

use std::collections::VecDeque;
use std::time::Duration;

use aes::Aes128;
use aes::cipher::{
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    generic_array::GenericArray,
};
use bytes::{BufMut, Bytes, BytesMut};
use cmac::{Cmac, Mac};
use egk_apdu_core::{CancelHandle, CardTransport, PresencePolicy, TransportError};
use egk_healthcard::constants::{ESIGN_AID, files, tags};
use egk_healthcard::ec::{BrainpoolCurve, Curve, Point, Uint};
use egk_healthcard::kdf::{KeyDerivationMode, derive_key};
use egk_healthcard::pace::{ID_PACE_ECDH_GM_AES_CBC_CMAC_128, PaceKey, authentication_token};
use egk_healthcard::tlv::{TlvReader, write_tlv};
use hex_literal::hex;
use rand::SeedableRng;
use rand::rngs::StdRng;

pub const SUCCESS: u16 = 0x9000;
/// Status without a dedicated meaning
pub const UNMAPPED: u16 = 0x6A88;
/// Secure messaging data objects incorrect
pub const SM_OBJECTS_INCORRECT: u16 = 0x6988;

/// EF.Version2 of a generation 2.1 card
pub const EF_VERSION2: [u8; 45] = hex!(
    "EF2BC003020000C103040302C21045474B47320000000000000000000000C403010000C503020000C703010000"
);

/// EF.Version2 of a generation 1 card, object system 3.0.0
pub const EF_VERSION2_GENERATION1: [u8; 45] = hex!(
    "EF2BC003020000C103030000C21045474B47320000000000000000000000C403010000C503020000C703010000"
);

/// EF.CardAccess advertising PACE generic mapping on `curve`
pub fn card_access(curve: BrainpoolCurve) -> Vec<u8> {
    let mut info = BytesMut::new();
    write_tlv(&mut info, 0x06, &ID_PACE_ECDH_GM_AES_CBC_CMAC_128);
    write_tlv(&mut info, 0x02, &[0x02]);
    write_tlv(&mut info, 0x02, &[curve.parameter_id() as u8]);
    let mut sequence = BytesMut::new();
    write_tlv(&mut sequence, 0x30, &info);
    let mut set = BytesMut::new();
    write_tlv(&mut set, 0x31, &sequence);
    set.to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectedFile {
    None,
    CardAccess,
    Certificate,
}

/// Card side of a PACE run in progress
#[derive(Debug, Default)]
struct CardPace {
    nonce: Option<Uint>,
    mapped: Option<Point>,
    host_key: Option<Vec<u8>>,
    card_key: Option<Vec<u8>>,
    key: Option<PaceKey>,
}

#[derive(Debug)]
pub struct FakeCard {
    pub can: String,
    pub curve: BrainpoolCurve,
    pub version: Vec<u8>,
    pub card_access: Vec<u8>,

    /// Frames received, in order
    pub commands: Vec<Vec<u8>>,
    /// Number of frames received
    pub calls: usize,
    /// Answer this call (1-based) with [`UNMAPPED`]
    pub fail_at: Option<usize>,
    /// Cancel the channel after answering this call
    pub cancel_after: Option<usize>,
    /// Flip a byte of the received PK2 before using it
    pub tamper_pk2: Option<usize>,
    /// Accept the host token but answer with a flipped card token
    pub tamper_card_token: bool,
    /// Flip a MAC byte of the protected answer to this call
    pub corrupt_response_mac: Option<usize>,
    pub present: bool,
    pub extended_length: bool,

    pub certificate: Vec<u8>,
    /// Sizes of consecutive READ BINARY answers, cycled
    pub chunks: Vec<usize>,
    /// Answer the read reaching the end of the file with 62 82
    pub eof_warning: bool,

    pub pin_status: u16,
    pub unlock_status: u16,
    /// Statuses for consecutive GET CHALLENGE commands, success once drained
    pub random_statuses: VecDeque<u16>,
    pub signature: Vec<u8>,

    /// Keys the card side derived
    pub agreed_key: Option<PaceKey>,
    /// Protected commands after unwrapping, in order
    pub unwrapped: Vec<Vec<u8>>,

    pace: CardPace,
    channel: Option<CardChannel>,
    selected: SelectedFile,
    reads: usize,
    rng: StdRng,
    cancel: CancelHandle,
    connected: bool,
}

impl FakeCard {
    pub fn new(can: &str) -> Self {
        Self::with_curve(can, BrainpoolCurve::P256r1)
    }

    pub fn with_curve(can: &str, curve: BrainpoolCurve) -> Self {
        Self {
            can: can.to_owned(),
            curve,
            version: EF_VERSION2.to_vec(),
            card_access: card_access(curve),
            commands: Vec::new(),
            calls: 0,
            fail_at: None,
            cancel_after: None,
            tamper_pk2: None,
            tamper_card_token: false,
            corrupt_response_mac: None,
            present: true,
            extended_length: false,
            certificate: Vec::new(),
            chunks: vec![256],
            eof_warning: true,
            pin_status: SUCCESS,
            unlock_status: SUCCESS,
            random_statuses: VecDeque::new(),
            signature: hex!("3045022100AA").to_vec(),
            agreed_key: None,
            unwrapped: Vec::new(),
            pace: CardPace::default(),
            channel: None,
            selected: SelectedFile::None,
            reads: 0,
            rng: StdRng::seed_from_u64(0xE6C),
            cancel: CancelHandle::new(),
            connected: true,
        }
    }

    /// Instruction bytes of the received frames
    pub fn instructions(&self) -> Vec<u8> {
        self.commands.iter().map(|c| c[1]).collect()
    }

    /// Send sequence counter of the card side channel
    pub fn ssc(&self) -> Option<u128> {
        self.channel.as_ref().map(|channel| channel.ssc)
    }

    fn handle_protected(&mut self, apdu: &[u8]) -> Bytes {
        let Some(mut channel) = self.channel.take() else {
            return self.respond(&[], SM_OBJECTS_INCORRECT);
        };
        let response = match channel.unwrap_command(apdu) {
            Some(plain) => {
                let answer = self.handle(&plain);
                self.unwrapped.push(plain);
                let mut wrapped = channel.wrap_response(&answer);
                if self.corrupt_response_mac == Some(self.calls) {
                    let index = wrapped.len() - 3;
                    wrapped[index] ^= 0x01;
                }
                Bytes::from(wrapped)
            }
            // a real card drops the channel after a bad MAC
            None => return self.respond(&[], SM_OBJECTS_INCORRECT),
        };
        self.channel = Some(channel);
        response
    }

    fn respond(&mut self, data: &[u8], status: u16) -> Bytes {
        let mut out = BytesMut::with_capacity(data.len() + 2);
        out.put_slice(data);
        out.put_u16(status);
        out.freeze()
    }

    fn handle(&mut self, apdu: &[u8]) -> Bytes {
        let (ins, p1, p2, data) = parse_command(apdu);
        match (ins, p1, p2) {
            (0xA4, 0x04, 0x0C) if data.is_empty() => {
                self.selected = SelectedFile::None;
                self.respond(&[], SUCCESS)
            }
            (0xA4, 0x04, 0x0C) if data == ESIGN_AID => self.respond(&[], SUCCESS),
            (0xA4, 0x02, _) => {
                let fid = u16::from_be_bytes([data[0], data[1]]);
                self.selected = match fid {
                    files::EF_CARD_ACCESS_FID => SelectedFile::CardAccess,
                    files::EF_C_CH_AUT_E256_FID => SelectedFile::Certificate,
                    _ => return self.respond(&[], 0x6A82),
                };
                self.reads = 0;
                self.respond(&[], SUCCESS)
            }
            (0xB0, p1, 0x00) if p1 == 0x80 | files::EF_VERSION2_SFI => {
                let version = self.version.clone();
                let status = if self.eof_warning { 0x6282 } else { SUCCESS };
                self.respond(&version, status)
            }
            (0xB0, p1, p2) => {
                let offset = usize::from(u16::from_be_bytes([p1, p2]));
                self.read_binary(offset)
            }
            (0x22, 0xC1, 0xA4) | (0x22, 0x41, 0xB6) => self.respond(&[], SUCCESS),
            (0x86, 0x00, 0x00) => self.general_authenticate(&data),
            (0x84, 0x00, 0x00) => {
                let status = self.random_statuses.pop_front().unwrap_or(SUCCESS);
                let length = match apdu[4] {
                    0 => 256,
                    n => usize::from(n),
                };
                let random = if status == SUCCESS { vec![0x5A; length] } else { Vec::new() };
                self.respond(&random, status)
            }
            (0x20, _, _) | (0x24, _, _) => {
                let status = self.pin_status;
                self.respond(&[], status)
            }
            (0x2C, _, _) => {
                let status = self.unlock_status;
                self.respond(&[], status)
            }
            (0x2A, 0x9E, 0x9A) => {
                let signature = self.signature.clone();
                self.respond(&signature, SUCCESS)
            }
            _ => self.respond(&[], 0x6D00),
        }
    }

    fn read_binary(&mut self, offset: usize) -> Bytes {
        let content = match self.selected {
            SelectedFile::CardAccess => self.card_access.clone(),
            SelectedFile::Certificate => self.certificate.clone(),
            SelectedFile::None => return self.respond(&[], 0x6986),
        };
        if offset >= content.len() {
            return self.respond(&[], 0x6B00);
        }

        let chunk = if self.selected == SelectedFile::Certificate {
            self.chunks[self.reads % self.chunks.len()]
        } else {
            content.len()
        };
        self.reads += 1;

        let end = (offset + chunk).min(content.len());
        let status = if end == content.len() && self.eof_warning {
            0x6282
        } else {
            SUCCESS
        };
        self.respond(&content[offset..end], status)
    }

    fn general_authenticate(&mut self, data: &[u8]) -> Bytes {
        let curve = self.curve.curve();
        let Ok(objects) = TlvReader::expect(data, 0x7C) else {
            return self.respond(&[], 0x6A80);
        };
        let Some(Ok(object)) = TlvReader::new(objects).next() else {
            // Round 1: nonce request
            let mut nonce = [0u8; 16];
            rand::RngCore::fill_bytes(&mut self.rng, &mut nonce);
            nonce[0] |= 0x01;
            self.pace = CardPace {
                nonce: Some(Uint::from_be_slice(&nonce)),
                ..CardPace::default()
            };
            let key = derive_key(self.can.as_bytes(), KeyDerivationMode::Password);
            let mut block = GenericArray::clone_from_slice(&nonce);
            Aes128::new(GenericArray::from_slice(&key)).encrypt_block(&mut block);
            return self.dynamic_response(tags::ENCRYPTED_NONCE, &block);
        };

        match object.tag {
            tags::MAPPING_DATA_HOST => {
                let Ok(pk1) = curve.decode_point(object.value) else {
                    return self.respond(&[], 0x6A80);
                };
                let secret = curve.random_scalar(&mut self.rng);
                let y1 = curve.mul_generator(&secret);
                let nonce = self.pace.nonce.unwrap_or(Uint::ZERO);
                let mapped = curve.add(&curve.mul_generator(&nonce), &curve.mul(&secret, &pk1));
                self.pace.mapped = Some(mapped);
                let encoded = curve.encode_point(&y1);
                self.dynamic_response(tags::MAPPING_DATA_CARD, &encoded)
            }
            tags::EPHEMERAL_KEY_HOST => {
                let mut pk2 = object.value.to_vec();
                if let Some(index) = self.tamper_pk2 {
                    pk2[index] ^= 0x01;
                }
                let mapped = self.pace.mapped.unwrap_or(Point::Infinity);
                let secret = curve.random_scalar(&mut self.rng);
                let y2 = curve.encode_point(&curve.mul(&secret, &mapped));
                if let Point::Affine { x, .. } = curve.mul(&secret, &lenient_point(&curve, &pk2)) {
                    let shared = curve.encode_field_element(&x);
                    self.pace.key = Some(PaceKey::new(
                        derive_key(&shared, KeyDerivationMode::Enc),
                        derive_key(&shared, KeyDerivationMode::Mac),
                    ));
                }
                self.pace.host_key = Some(pk2);
                self.pace.card_key = Some(y2.clone());
                self.dynamic_response(tags::EPHEMERAL_KEY_CARD, &y2)
            }
            tags::AUTH_TOKEN_HOST => {
                let (Some(key), Some(host_key), Some(card_key)) = (
                    self.pace.key.clone(),
                    self.pace.host_key.clone(),
                    self.pace.card_key.clone(),
                ) else {
                    return self.respond(&[], 0x6300);
                };
                let oid = &ID_PACE_ECDH_GM_AES_CBC_CMAC_128;
                if object.value != authentication_token(key.mac(), oid, &card_key) {
                    return self.respond(&[], 0x6300);
                }
                let mut token = authentication_token(key.mac(), oid, &host_key);
                if self.tamper_card_token {
                    token[0] ^= 0x01;
                }
                self.channel = Some(CardChannel::new(key.clone()));
                self.agreed_key = Some(key);
                self.dynamic_response(tags::AUTH_TOKEN_CARD, &token)
            }
            _ => self.respond(&[], 0x6A80),
        }
    }

    fn dynamic_response(&mut self, tag: u32, value: &[u8]) -> Bytes {
        let mut inner = BytesMut::new();
        write_tlv(&mut inner, tag, value);
        let mut outer = BytesMut::new();
        write_tlv(&mut outer, 0x7C, &inner);
        self.respond(&outer, SUCCESS)
    }
}

/// Card side of secure messaging
#[derive(Debug)]
struct CardChannel {
    key: PaceKey,
    ssc: u128,
}

impl CardChannel {
    fn new(key: PaceKey) -> Self {
        Self { key, ssc: 0 }
    }

    fn iv(&self) -> [u8; 16] {
        let mut block = GenericArray::clone_from_slice(&self.ssc.to_be_bytes());
        Aes128::new(GenericArray::from_slice(self.key.enc())).encrypt_block(&mut block);
        block.into()
    }

    fn mac(&self, data: &[u8]) -> [u8; 8] {
        let mut mac = <Cmac<Aes128> as KeyInit>::new(self.key.mac().into());
        mac.update(&self.ssc.to_be_bytes());
        mac.update(data);
        let mut out = [0u8; 8];
        out.copy_from_slice(&mac.finalize().into_bytes()[..8]);
        out
    }

    /// Check and strip the protection of a command, `None` when the MAC fails
    fn unwrap_command(&mut self, apdu: &[u8]) -> Option<Vec<u8>> {
        self.ssc += 1;
        let (_, _, _, body) = parse_command(apdu);
        if body.len() < 10 || body[body.len() - 10..][..2] != [0x8E, 0x08] {
            return None;
        }
        let (authenticated, mac) = body.split_at(body.len() - 10);

        let mut mac_input = padded(&apdu[..4]);
        if !authenticated.is_empty() {
            mac_input.extend(padded(authenticated));
        }
        if self.mac(&mac_input)[..] != mac[2..] {
            return None;
        }

        let mut data = None;
        let mut le = None;
        for object in TlvReader::new(authenticated) {
            let object = object.ok()?;
            match object.tag {
                0x87 => data = Some(self.decrypt(&object.value[1..])),
                0x97 => le = object.value.last().copied(),
                _ => return None,
            }
        }

        let mut plain = vec![apdu[0] & !0x0C, apdu[1], apdu[2], apdu[3]];
        if let Some(data) = data {
            plain.push(data.len() as u8);
            plain.extend(data);
        }
        plain.extend(le);
        Some(plain)
    }

    /// Protect a plain answer, trailer included
    fn wrap_response(&mut self, answer: &[u8]) -> Vec<u8> {
        self.ssc += 1;
        let (data, status) = answer.split_at(answer.len() - 2);

        let mut objects = BytesMut::new();
        if !data.is_empty() {
            let mut value = vec![0x01];
            value.extend(self.encrypt(data));
            write_tlv(&mut objects, 0x87, &value);
        }
        write_tlv(&mut objects, 0x99, status);
        let mac = self.mac(&padded(&objects));

        let mut out = objects.to_vec();
        out.extend([0x8E, 0x08]);
        out.extend(mac);
        out.extend(status);
        out
    }

    fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = padded(data);
        let mut cipher = cbc::Encryptor::<Aes128>::new(self.key.enc().into(), &self.iv().into());
        for block in buf.chunks_exact_mut(16) {
            cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        buf
    }

    fn decrypt(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        let mut cipher = cbc::Decryptor::<Aes128>::new(self.key.enc().into(), &self.iv().into());
        for block in buf.chunks_exact_mut(16) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        while buf.last() == Some(&0x00) {
            buf.pop();
        }
        buf.pop();
        buf
    }
}

/// ISO 7816 padding to the AES block size
fn padded(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(0x80);
    while out.len() % 16 != 0 {
        out.push(0x00);
    }
    out
}

fn lenient_point(curve: &Curve, encoded: &[u8]) -> Point {
    let len = curve.field_len();
    if encoded.len() != 1 + 2 * len {
        return Point::Infinity;
    }
    Point::Affine {
        x: Uint::from_be_slice(&encoded[1..1 + len]),
        y: Uint::from_be_slice(&encoded[1 + len..]),
    }
}

/// Split a short or extended frame into header and data
fn parse_command(apdu: &[u8]) -> (u8, u8, u8, Vec<u8>) {
    let (ins, p1, p2) = (apdu[1], apdu[2], apdu[3]);
    let body = &apdu[4..];
    let data = match body.len() {
        0 | 1 => Vec::new(),
        3 if body[0] == 0 => Vec::new(),
        _ if body[0] == 0 => {
            let lc = usize::from(u16::from_be_bytes([body[1], body[2]]));
            body[3..3 + lc].to_vec()
        }
        _ => {
            let lc = usize::from(body[0]);
            body[1..1 + lc].to_vec()
        }
    };
    (ins, p1, p2, data)
}

impl CardTransport for FakeCard {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.calls += 1;
        self.commands.push(command.to_vec());

        let response = if self.fail_at == Some(self.calls) {
            self.respond(&[], UNMAPPED)
        } else if command[0] & 0x0C == 0x0C {
            self.handle_protected(command)
        } else {
            self.channel = None;
            self.handle(command)
        };
        if self.cancel_after == Some(self.calls) {
            self.cancel.cancel();
        }
        Ok(response)
    }

    fn is_card_present(&mut self) -> Result<bool, TransportError> {
        Ok(self.present)
    }

    fn presence_policy(&self) -> PresencePolicy {
        PresencePolicy::new(3, Duration::ZERO)
    }

    fn supports_extended_length(&self) -> bool {
        self.extended_length
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
        self.pace = CardPace::default();
        self.channel = None;
        self.selected = SelectedFile::None;
        self.connected = true;
        Ok(())
    }
}
