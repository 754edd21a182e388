use bytes::{Bytes, BytesMut};
use derive_more::Display;
use egk_apdu_core::{Executor, Response, StatusWord};
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument, warn};

use super::{PaceInfo, PaceKey};
use crate::capability::CardVersion2;
use crate::commands::{
    HealthCardCommand, HealthCardExecutor, PasswordReference, TAG_DYNAMIC_AUTHENTICATION_DATA,
};
use crate::constants::{files, tags};
use crate::crypto::{BLOCK_SIZE, MAC_LENGTH, calculate_mac, decrypt_block, mac_eq};
use crate::ec::{Curve, Point, Uint};
use crate::error::{AuthenticationError, CapabilityError, Error, ProtocolError, Result};
use crate::kdf::{KEY_LENGTH, KeyDerivationMode, derive_key};
use crate::status::ResponseStatus;
use crate::tlv::{TlvReader, write_tlv};

/// Status a card answers the final round with when the CAN was wrong
const ACCESS_NUMBER_REJECTED: StatusWord = StatusWord::new(0x63, 0x00);

/// Where a handshake currently stands
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaceState {
    /// Nothing sent yet
    Init,
    /// Card version and PACE parameters read, security environment set
    VersionChecked,
    /// Nonce received and decrypted
    NonceDecrypted,
    /// Mapping keys exchanged
    Round1Sent,
    /// Ephemeral keys on the mapped generator exchanged
    Round2Sent,
    /// Authentication tokens exchanged
    MutualAuthSent,
    /// Card token verified, keys released
    Authenticated,
    /// Aborted, no key will be produced
    Failed,
}

/// One run of PACE against a card
///
/// The handshake borrows the executor for its lifetime, so no other command can
/// interleave with the rounds. Ephemeral scalars come from the injected `rng`.
#[derive(Debug)]
pub struct PaceHandshake<'a, E: ?Sized, R> {
    executor: &'a mut E,
    rng: &'a mut R,
    password: PasswordReference,
    state: PaceState,
}

impl<'a, E, R> PaceHandshake<'a, E, R>
where
    E: Executor + ?Sized,
    R: RngCore + CryptoRng,
{
    /// Prepare a handshake authenticating with the CAN
    pub const fn new(executor: &'a mut E, rng: &'a mut R) -> Self {
        Self {
            executor,
            rng,
            password: PasswordReference::CAN,
            state: PaceState::Init,
        }
    }

    /// Authenticate with another password object
    pub const fn with_password(mut self, password: PasswordReference) -> Self {
        self.password = password;
        self
    }

    /// Current state
    pub const fn state(&self) -> PaceState {
        self.state
    }

    /// Run all rounds and return the session keys
    ///
    /// Any failure leaves the handshake in [`PaceState::Failed`]; a fresh handshake
    /// is needed to try again.
    #[instrument(skip_all, fields(password = self.password.to_byte()))]
    pub fn run(&mut self, can: &str) -> Result<PaceKey> {
        if self.state != PaceState::Init {
            return Err(Error::InvalidInput("handshake already ran"));
        }
        if can.is_empty() || !can.bytes().all(|b| b.is_ascii_digit()) {
            self.state = PaceState::Failed;
            return Err(Error::InvalidInput("card access number must be decimal digits"));
        }

        match self.execute(can) {
            Ok(key) => {
                self.transition(PaceState::Authenticated);
                Ok(key)
            }
            Err(e) => {
                warn!(failed_in = %self.state, error = %e, "PACE aborted");
                self.state = PaceState::Failed;
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: PaceState) {
        debug!(from = %self.state, to = %next, "PACE transition");
        self.state = next;
    }

    fn execute(&mut self, can: &str) -> Result<PaceKey> {
        let info = self.read_parameters().map_err(capability_failure)?;
        self.transition(PaceState::VersionChecked);
        let curve = info.curve().curve();
        debug!(parameter_id = info.parameter_id(), "PACE parameters");

        // Round 1: encrypted nonce
        let response = self.general_authenticate(true, None)?;
        let encrypted = dynamic_data(&response, tags::ENCRYPTED_NONCE)?;
        let encrypted: &[u8; BLOCK_SIZE] = encrypted
            .try_into()
            .map_err(|_| AuthenticationError::InvalidNonce)?;
        let password_key = derive_key(can.as_bytes(), KeyDerivationMode::Password);
        let nonce = Uint::from_be_slice(&decrypt_block(&password_key, encrypted));
        if nonce.is_zero() {
            return Err(AuthenticationError::InvalidNonce.into());
        }
        self.transition(PaceState::NonceDecrypted);

        // Round 2: generic mapping
        let x1 = curve.random_scalar(&mut *self.rng);
        let pk1 = curve.mul_generator(&x1);
        let pk1_encoded = curve.encode_point(&pk1);
        let response =
            self.general_authenticate(true, Some((tags::MAPPING_DATA_HOST, &pk1_encoded)))?;
        let y1 = card_point(&curve, &response, tags::MAPPING_DATA_CARD)?;
        if y1 == pk1 {
            return Err(AuthenticationError::InvalidKeyAgreement("mapping key echoed").into());
        }
        let mapped = curve.add(&curve.mul_generator(&nonce), &curve.mul(&x1, &y1));
        if mapped.is_infinity() {
            return Err(
                AuthenticationError::InvalidKeyAgreement("mapped generator at infinity").into(),
            );
        }
        self.transition(PaceState::Round1Sent);

        // Round 3: key agreement on the mapped generator
        let x2 = curve.random_scalar(&mut *self.rng);
        let pk2 = curve.mul(&x2, &mapped);
        let pk2_encoded = curve.encode_point(&pk2);
        let response =
            self.general_authenticate(true, Some((tags::EPHEMERAL_KEY_HOST, &pk2_encoded)))?;
        let y2 = card_point(&curve, &response, tags::EPHEMERAL_KEY_CARD)?;
        if y2 == pk2 {
            return Err(AuthenticationError::InvalidKeyAgreement("ephemeral key echoed").into());
        }
        let Point::Affine { x: shared, .. } = curve.mul(&x2, &y2) else {
            return Err(
                AuthenticationError::InvalidKeyAgreement("shared secret at infinity").into(),
            );
        };
        let key = PaceKey::derive(&curve.encode_field_element(&shared));
        self.transition(PaceState::Round2Sent);

        // Round 4: mutual authentication
        let protocol_id = info.protocol_id();
        let token = authentication_token(key.mac(), protocol_id, &curve.encode_point(&y2));
        let expected = authentication_token(key.mac(), protocol_id, &pk2_encoded);
        let rejected = Some(ResponseStatus::Other(ACCESS_NUMBER_REJECTED));
        let response =
            match self.general_authenticate(false, Some((tags::AUTH_TOKEN_HOST, &token))) {
                Err(e) if e.response_status() == rejected => {
                    return Err(AuthenticationError::CardRejectedAccessNumber.into());
                }
                other => other?,
            };
        self.transition(PaceState::MutualAuthSent);
        let card_token = dynamic_data(&response, tags::AUTH_TOKEN_CARD)?;
        if !mac_eq(card_token, &expected) {
            return Err(AuthenticationError::TokenMismatch.into());
        }

        Ok(key)
    }

    /// Step 0: version check, EF.CardAccess and MSE: Set AT
    fn read_parameters(&mut self) -> Result<PaceInfo> {
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectRoot)?;

        let version = self
            .executor
            .read_expecting_content(&HealthCardCommand::ReadBinarySfi {
                sfi: files::EF_VERSION2_SFI,
                offset: 0,
            })?;
        CardVersion2::parse(version.payload())
            .map_err(ProtocolError::from)?
            .ensure_supported()?;

        self.executor
            .send_expecting_success(&HealthCardCommand::SelectFile {
                fid: files::EF_CARD_ACCESS_FID,
                fcp: false,
            })?;
        let card_access = self
            .executor
            .read_expecting_content(&HealthCardCommand::ReadBinary { offset: 0 })?;
        let info = PaceInfo::parse(card_access.payload())?;

        self.executor
            .send_expecting_success(&HealthCardCommand::MseSetAuthentication {
                protocol_id: Bytes::from_static(info.protocol_id()),
                password: self.password,
            })?;

        Ok(info)
    }

    fn general_authenticate(
        &mut self,
        chained: bool,
        data: Option<(u32, &[u8])>,
    ) -> Result<Response> {
        let command = match data {
            Some((tag, value)) => HealthCardCommand::general_authenticate(chained, tag, value),
            None => HealthCardCommand::GeneralAuthenticate {
                chained,
                data: Bytes::new(),
            },
        };
        self.executor.send_expecting_success(&command)
    }
}

/// Authentication token `CMAC(k_mac, 7F49 { 06 oid, 86 point })` truncated to 8 bytes
pub fn authentication_token(
    mac_key: &[u8; KEY_LENGTH],
    protocol_id: &[u8],
    point: &[u8],
) -> [u8; MAC_LENGTH] {
    let mut inner = BytesMut::new();
    write_tlv(&mut inner, tags::OBJECT_IDENTIFIER, protocol_id);
    write_tlv(&mut inner, tags::EC_POINT, point);
    let mut public_key = BytesMut::new();
    write_tlv(&mut public_key, tags::PUBLIC_KEY, &inner);
    calculate_mac(mac_key, &public_key)
}

/// Value of `tag` inside the dynamic authentication data of a response
fn dynamic_data(response: &Response, tag: u32) -> Result<&[u8]> {
    let objects = TlvReader::expect(response.payload(), TAG_DYNAMIC_AUTHENTICATION_DATA)?;
    Ok(TlvReader::find(objects, tag)?.value)
}

fn card_point(curve: &Curve, response: &Response, tag: u32) -> Result<Point> {
    curve
        .decode_point(dynamic_data(response, tag)?)
        .map_err(|_| AuthenticationError::InvalidKeyAgreement("card key not on curve").into())
}

/// Failures before the first round mean the card cannot run PACE with us
fn capability_failure(error: Error) -> Error {
    match error {
        Error::Protocol(e) => Error::Capability(CapabilityError::Rejected(e)),
        other => other,
    }
}
