//! Key derivation for PACE and secure messaging (BSI TR-03110 A.2.3)

use sha1::{Digest, Sha1};

/// Length of every derived AES-128 key
pub const KEY_LENGTH: usize = 16;

/// Purpose a key is derived for, appended as a 32-bit big-endian counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum KeyDerivationMode {
    /// Secure messaging encryption key
    Enc = 1,
    /// Secure messaging MAC key
    Mac = 2,
    /// Key decrypting the PACE nonce, derived from the password
    Password = 3,
}

impl KeyDerivationMode {
    /// Counter value appended to the secret
    pub const fn counter(self) -> u32 {
        self as u32
    }
}

/// Derive a 128-bit key from a shared secret
///
/// # Arguments
///
/// * `secret` - The shared secret, the raw password or the x-coordinate of the agreed point.
/// * `mode` - What the key will be used for.
///
/// # Returns
///
/// The first 16 bytes of `SHA-1(secret || counter)`.
pub fn derive_key(secret: &[u8], mode: KeyDerivationMode) -> [u8; KEY_LENGTH] {
    let mut hasher = Sha1::new();
    hasher.update(secret);
    hasher.update(mode.counter().to_be_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&digest[..KEY_LENGTH]);
    key
}
