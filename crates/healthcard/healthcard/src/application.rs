//! Health card application
//!
//! [`HealthCard`] owns the executor for one card session. It establishes the PACE
//! channel and runs the operations that need it, one command at a time.

use bytes::{Bytes, BytesMut};
use egk_apdu_core::prelude::*;
use rand::{CryptoRng, RngCore};
use tracing::{debug, info, warn};

use crate::capability::CardVersion2;
use crate::commands::{
    CardKeyReference, EncryptedPinFormat2, HealthCardCommand, HealthCardExecutor,
    MAX_READ_OFFSET, PasswordReference, SIGNATURE_ALGORITHM_ECDSA,
};
use crate::constants::{ESIGN_AID, files};
use crate::error::{Error, ProtocolError, Result};
use crate::pace::{PaceHandshake, PaceKey};
use crate::secure_messaging::SecureMessaging;
use crate::status::ResponseStatus;

/// Tunables for a card session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCardConfig {
    /// GET CHALLENGE attempts before giving up
    pub random_attempts: u32,
    /// Password object PACE authenticates with
    pub can_reference: PasswordReference,
    /// Password object checked by the PIN operations
    pub pin_reference: PasswordReference,
}

impl Default for HealthCardConfig {
    fn default() -> Self {
        Self {
            random_attempts: 3,
            can_reference: PasswordReference::CAN,
            pin_reference: PasswordReference::MR_PIN_HOME,
        }
    }
}

impl HealthCardConfig {
    /// Set the number of GET CHALLENGE attempts
    pub const fn with_random_attempts(mut self, attempts: u32) -> Self {
        self.random_attempts = attempts;
        self
    }

    /// Set the password object used by PACE
    pub const fn with_can_reference(mut self, reference: PasswordReference) -> Self {
        self.can_reference = reference;
        self
    }

    /// Set the password object used by the PIN operations
    pub const fn with_pin_reference(mut self, reference: PasswordReference) -> Self {
        self.pin_reference = reference;
        self
    }
}

/// Result of presenting a secret to the card
///
/// Wrong secrets and blocked counters are answers the caller handles, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// Secret accepted
    Verified,
    /// Secret rejected
    WrongSecret {
        /// Attempts left before the password blocks
        retries_left: u8,
    },
    /// Retry counter exhausted
    Blocked,
}

impl PinOutcome {
    fn from_status(command: &'static str, status: ResponseStatus) -> Result<Self> {
        match status {
            ResponseStatus::Success => Ok(Self::Verified),
            ResponseStatus::PasswordBlocked => Ok(Self::Blocked),
            status => match status.retries_left() {
                Some(retries_left) => Ok(Self::WrongSecret { retries_left }),
                None => Err(Error::unexpected(command, status)),
            },
        }
    }
}

/// Session with one electronic health card
#[derive(Debug)]
pub struct HealthCard<T: CardTransport> {
    executor: CardExecutor<T>,
    config: HealthCardConfig,
}

impl<T: CardTransport> HealthCard<T> {
    /// Start a session over `transport` with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, HealthCardConfig::default())
    }

    /// Start a session with an explicit configuration
    pub const fn with_config(transport: T, config: HealthCardConfig) -> Self {
        Self {
            executor: CardExecutor::new(transport),
            config,
        }
    }

    /// Session configuration
    pub const fn config(&self) -> &HealthCardConfig {
        &self.config
    }

    /// Executor carrying the commands
    pub const fn executor(&self) -> &CardExecutor<T> {
        &self.executor
    }

    /// Mutable access to the executor
    pub const fn executor_mut(&mut self) -> &mut CardExecutor<T> {
        &mut self.executor
    }

    /// End the session and hand back the transport
    pub fn into_transport(self) -> T {
        self.executor.into_transport()
    }

    /// Whether commands currently travel under secure messaging
    pub fn is_secure_channel_established(&self) -> bool {
        self.executor.security_level().encrypted
    }

    /// Read EF.Version2 below the MF
    pub fn read_version(&mut self) -> Result<CardVersion2> {
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectRoot)?;
        let response = self
            .executor
            .read_expecting_content(&HealthCardCommand::ReadBinarySfi {
                sfi: files::EF_VERSION2_SFI,
                offset: 0,
            })?;
        Ok(CardVersion2::parse(response.payload()).map_err(ProtocolError::from)?)
    }

    /// Run PACE with the card access number and protect all later commands
    ///
    /// A previously established channel is dropped first, so a failed run leaves
    /// the session without secure messaging.
    pub fn establish_secure_channel<R>(&mut self, can: &str, rng: &mut R) -> Result<PaceKey>
    where
        R: RngCore + CryptoRng,
    {
        self.executor.clear_processors();

        let key = PaceHandshake::new(&mut self.executor, rng)
            .with_password(self.config.can_reference)
            .run(can)?;

        self.executor
            .add_processor(Box::new(SecureMessaging::new(key.clone())));
        info!("Secure channel established");
        Ok(key)
    }

    /// Present the PIN
    pub fn verify_pin(&mut self, pin: &str) -> Result<PinOutcome> {
        let pin = EncryptedPinFormat2::new(pin)?;
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectRoot)?;

        let command = HealthCardCommand::Verify {
            password: self.config.pin_reference,
            pin,
        };
        let response = self.executor.send(&command)?;
        let outcome = PinOutcome::from_status(command.name(), ResponseStatus::from(&response))?;
        debug!(?outcome, "PIN verification");
        Ok(outcome)
    }

    /// Replace the PIN, presenting the current one
    pub fn change_pin(&mut self, old: &str, new: &str) -> Result<PinOutcome> {
        let old = EncryptedPinFormat2::new(old)?;
        let new = EncryptedPinFormat2::new(new)?;
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectRoot)?;

        let command = HealthCardCommand::ChangeReferenceData {
            password: self.config.pin_reference,
            old,
            new,
        };
        let response = self.executor.send(&command)?;
        let outcome = PinOutcome::from_status(command.name(), ResponseStatus::from(&response))?;
        debug!(?outcome, "PIN change");
        Ok(outcome)
    }

    /// Reset the PIN retry counter with the PUK, optionally setting a new PIN
    pub fn unlock_card(&mut self, puk: &str, new_pin: Option<&str>) -> Result<()> {
        let puk = EncryptedPinFormat2::new(puk)?;
        let new = new_pin.map(EncryptedPinFormat2::new).transpose()?;
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectRoot)?;

        self.executor
            .send_expecting_success(&HealthCardCommand::ResetRetryCounter {
                password: self.config.pin_reference,
                puk,
                new,
            })?;
        info!("Card unlocked");
        Ok(())
    }

    /// Random bytes generated by the card
    ///
    /// Repeats GET CHALLENGE while the card answers with anything other than
    /// success or "security status not satisfied", up to the configured attempts.
    /// Either of those two ends the loop with whatever payload came back, which is
    /// empty when the card withheld the challenge.
    pub fn get_random(&mut self, length: usize) -> Result<Bytes> {
        let command = HealthCardCommand::get_random(length)?;
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectRoot)?;

        let mut last = None;
        for attempt in 1..=self.config.random_attempts.max(1) {
            let response = self.executor.send(&command)?;
            match ResponseStatus::from(&response) {
                ResponseStatus::Success | ResponseStatus::SecurityStatusNotSatisfied => {
                    return Ok(response.into_payload());
                }
                status => {
                    warn!(attempt, %status, "GET CHALLENGE failed, retrying");
                    last = Some(status);
                }
            }
        }

        Err(match last {
            Some(status) => Error::unexpected(command.name(), status),
            None => Error::InvalidInput("no attempts configured"),
        })
    }

    /// Content of the authentication certificate EF.C.CH.AUT.E256
    pub fn retrieve_certificate(&mut self) -> Result<Bytes> {
        self.select_esign()?;
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectFile {
                fid: files::EF_C_CH_AUT_E256_FID,
                fcp: true,
            })?;

        let mut certificate = BytesMut::new();
        loop {
            let offset = certificate.len();
            if offset > usize::from(MAX_READ_OFFSET) {
                return Err(ProtocolError::FileTooLarge.into());
            }
            let command = HealthCardCommand::read_binary(offset)?;
            let response = self.executor.send(&command)?;
            let status = ResponseStatus::from(&response);
            match status {
                ResponseStatus::Success if response.payload().is_empty() => {
                    return Err(ProtocolError::NoProgress { offset }.into());
                }
                ResponseStatus::Success => certificate.extend_from_slice(response.payload()),
                ResponseStatus::EndOfFileWarning | ResponseStatus::OffsetTooBig => {
                    certificate.extend_from_slice(response.payload());
                    break;
                }
                status => return Err(Error::unexpected(command.name(), status)),
            }
        }

        debug!(length = certificate.len(), "Certificate read");
        Ok(certificate.freeze())
    }

    /// Sign a challenge with the authentication key PrK.CH.AUT.E256
    pub fn sign_challenge(&mut self, challenge: &[u8]) -> Result<Bytes> {
        if challenge.is_empty() {
            return Err(Error::InvalidInput("challenge must not be empty"));
        }
        self.select_esign()?;
        self.executor
            .send_expecting_success(&HealthCardCommand::MseSetSignature {
                key: CardKeyReference::PRK_CH_AUT_E256,
                algorithm: SIGNATURE_ALGORITHM_ECDSA,
            })?;
        let response = self
            .executor
            .send_expecting_success(&HealthCardCommand::PsoComputeDigitalSignature {
                data: Bytes::copy_from_slice(challenge),
            })?;
        Ok(response.into_payload())
    }

    fn select_esign(&mut self) -> Result<()> {
        self.executor
            .send_expecting_success(&HealthCardCommand::SelectApplication {
                aid: Bytes::from_static(ESIGN_AID),
            })?;
        Ok(())
    }
}
