use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::kdf::{KEY_LENGTH, KeyDerivationMode, derive_key};

/// Session keys agreed by a completed PACE run
///
/// Only constructed after the card's authentication token verified.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PaceKey {
    enc: [u8; KEY_LENGTH],
    mac: [u8; KEY_LENGTH],
}

impl PaceKey {
    /// Wrap already derived keys
    pub const fn new(enc: [u8; KEY_LENGTH], mac: [u8; KEY_LENGTH]) -> Self {
        Self { enc, mac }
    }

    /// Derive both keys from the shared secret
    pub(crate) fn derive(shared_secret: &[u8]) -> Self {
        Self {
            enc: derive_key(shared_secret, KeyDerivationMode::Enc),
            mac: derive_key(shared_secret, KeyDerivationMode::Mac),
        }
    }

    /// Encryption key
    pub const fn enc(&self) -> &[u8; KEY_LENGTH] {
        &self.enc
    }

    /// MAC key
    pub const fn mac(&self) -> &[u8; KEY_LENGTH] {
        &self.mac
    }
}

impl fmt::Debug for PaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaceKey").finish_non_exhaustive()
    }
}
