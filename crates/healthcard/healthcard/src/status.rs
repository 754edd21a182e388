//! Classification of card status words

use derive_more::Display;
use egk_apdu_core::{Response, StatusWord};

/// Status word as seen by the health card operations
///
/// Only the statuses operations branch on get their own variant. Everything
/// else lands in [`ResponseStatus::Other`] and is a failure wherever it shows up.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    /// 90 00
    #[display("success")]
    Success,
    /// 63 C1, one attempt left
    #[display("wrong secret, 1 attempt left")]
    WrongSecretWarningCount1,
    /// 63 C2
    #[display("wrong secret, 2 attempts left")]
    WrongSecretWarningCount2,
    /// 63 C3
    #[display("wrong secret, 3 attempts left")]
    WrongSecretWarningCount3,
    /// 69 83, retry counter exhausted
    #[display("password blocked")]
    PasswordBlocked,
    /// 69 82
    #[display("security status not satisfied")]
    SecurityStatusNotSatisfied,
    /// 62 82, fewer bytes than requested were left in the file
    #[display("end of file")]
    EndOfFileWarning,
    /// 6B 00, read offset beyond the end of the file
    #[display("offset too big")]
    OffsetTooBig,
    /// Any status word without a dedicated meaning
    #[display("status {} ({})", _0, _0.description())]
    Other(StatusWord),
}

impl ResponseStatus {
    /// Map a status word through the fixed classification table
    pub const fn from_status_word(status: StatusWord) -> Self {
        match status.to_u16() {
            0x9000 => Self::Success,
            0x63C1 => Self::WrongSecretWarningCount1,
            0x63C2 => Self::WrongSecretWarningCount2,
            0x63C3 => Self::WrongSecretWarningCount3,
            0x6983 => Self::PasswordBlocked,
            0x6982 => Self::SecurityStatusNotSatisfied,
            0x6282 => Self::EndOfFileWarning,
            0x6B00 => Self::OffsetTooBig,
            _ => Self::Other(status),
        }
    }

    /// Retry counter carried by a wrong-secret warning
    pub const fn retries_left(&self) -> Option<u8> {
        match self {
            Self::WrongSecretWarningCount1 => Some(1),
            Self::WrongSecretWarningCount2 => Some(2),
            Self::WrongSecretWarningCount3 => Some(3),
            _ => None,
        }
    }
}

impl From<StatusWord> for ResponseStatus {
    fn from(status: StatusWord) -> Self {
        Self::from_status_word(status)
    }
}

impl From<&Response> for ResponseStatus {
    fn from(response: &Response) -> Self {
        Self::from_status_word(response.status())
    }
}
