//! Electronic health card (eGK) access
//!
//! Establishes a PACE channel from the card access number and runs the operations
//! that need it: PIN management, card randomness, the authentication certificate
//! and challenge signing.
//!
//! ```no_run
//! # fn demo<T: egk_apdu_core::CardTransport>(transport: T) -> egk_healthcard::Result<()> {
//! use egk_healthcard::{HealthCard, PinOutcome};
//!
//! let mut card = HealthCard::new(transport);
//! card.establish_secure_channel("123123", &mut rand::rng())?;
//! if let PinOutcome::WrongSecret { retries_left } = card.verify_pin("123456")? {
//!     println!("{retries_left} attempts left");
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod application;
pub mod capability;
pub mod commands;
pub mod constants;
mod crypto;
pub mod ec;
mod error;
pub mod kdf;
pub mod pace;
pub mod secure_messaging;
pub mod status;
pub mod tlv;

pub use application::{HealthCard, HealthCardConfig, PinOutcome};
pub use capability::CardVersion2;
pub use commands::{HealthCardCommand, HealthCardExecutor, PasswordReference};
pub use error::{
    AuthenticationError, CapabilityError, Error, ErrorKind, HandshakeError, ProtocolError, Result,
};
pub use pace::{PaceHandshake, PaceInfo, PaceKey, PaceState};
pub use secure_messaging::SecureMessaging;
pub use status::ResponseStatus;
