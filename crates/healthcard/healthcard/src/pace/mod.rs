//! Password Authenticated Connection Establishment
//!
//! ECDH generic mapping over the Brainpool curves with AES-128 session keys,
//! run as a synchronous state machine with one card round trip per transition.

mod handshake;
mod info;
mod key;

pub use handshake::{PaceHandshake, PaceState, authentication_token};
pub use info::{ID_PACE_ECDH_GM_AES_CBC_CMAC_128, PaceInfo};
pub use key::PaceKey;
