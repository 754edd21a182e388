//! Password references and PIN blocks

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Error;

/// Marks a reference as DF-specific in P2
const DF_SPECIFIC: u8 = 0x80;

/// Password object addressed by VERIFY, CHANGE REFERENCE DATA, RESET RETRY COUNTER and MSE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PasswordReference {
    id: u8,
    df_specific: bool,
}

impl PasswordReference {
    /// MR.PIN.home, the PIN protecting the medical data
    pub const MR_PIN_HOME: Self = Self::global(0x01);

    /// Card access number used to run PACE
    pub const CAN: Self = Self::global(0x02);

    /// Password in the MF
    pub const fn global(id: u8) -> Self {
        Self {
            id,
            df_specific: false,
        }
    }

    /// Password in the currently selected DF
    pub const fn df_specific(id: u8) -> Self {
        Self {
            id,
            df_specific: true,
        }
    }

    /// Byte as placed in P2 or a `83` data object
    pub const fn to_byte(self) -> u8 {
        if self.df_specific {
            self.id | DF_SPECIFIC
        } else {
            self.id
        }
    }
}

/// Private key slot addressed by MSE: SET for signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardKeyReference {
    id: u8,
    df_specific: bool,
}

impl CardKeyReference {
    /// PrK.ChAut.E256 in DF.ESIGN, the authentication key of the card holder
    pub const PRK_CH_AUT_E256: Self = Self {
        id: 0x04,
        df_specific: true,
    };

    /// Key in the MF
    pub const fn global(id: u8) -> Self {
        Self {
            id,
            df_specific: false,
        }
    }

    /// Byte as placed in the `84` data object
    pub const fn to_byte(self) -> u8 {
        if self.df_specific {
            self.id | DF_SPECIFIC
        } else {
            self.id
        }
    }
}

/// ISO 9564 format 2 PIN block: `2N` followed by BCD digits padded with `F`
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptedPinFormat2([u8; Self::LENGTH]);

impl EncryptedPinFormat2 {
    /// Block length in bytes
    pub const LENGTH: usize = 8;

    /// Shortest accepted secret
    pub const MIN_DIGITS: usize = 4;

    /// Longest accepted secret
    pub const MAX_DIGITS: usize = 12;

    /// Encode a numeric secret
    pub fn new(secret: &str) -> Result<Self, Error> {
        let digits = secret.as_bytes();
        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(Error::InvalidInput("secret must have 4 to 12 digits"));
        }
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(Error::InvalidInput("secret must be numeric"));
        }

        let mut block = [0xFF; Self::LENGTH];
        block[0] = 0x20 | digits.len() as u8;
        for (i, digit) in digits.iter().enumerate() {
            let nibble = digit - b'0';
            let byte = &mut block[1 + i / 2];
            *byte = if i % 2 == 0 {
                (nibble << 4) | 0x0F
            } else {
                (*byte & 0xF0) | nibble
            };
        }
        Ok(Self(block))
    }

    /// Raw block
    pub const fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptedPinFormat2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptedPinFormat2(..)")
    }
}
