//! Error types for PC/SC transport

use egk_apdu_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// No card was inserted before the wait expired
    #[error("No card inserted in time")]
    WaitTimeout,

    /// Card was removed or reset
    #[error("Card was removed")]
    CardRemoved,

    /// The worker owning the card stopped answering
    #[error("Card I/O timed out")]
    Timeout,

    /// The worker owning the card is gone
    #[error("Card worker stopped")]
    WorkerStopped,
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(e) => driver_error(e),
            PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_) => Self::Connection,
            PcscError::NoCard(_) | PcscError::WaitTimeout => Self::CardAbsent { attempts: 1 },
            PcscError::CardRemoved => Self::CardRemoved,
            PcscError::Timeout => Self::Timeout,
            PcscError::WorkerStopped => Self::Device,
        }
    }
}

/// Classify a PC/SC status the way the channel reports it
pub(crate) fn driver_error(error: pcsc::Error) -> TransportError {
    match error {
        pcsc::Error::RemovedCard | pcsc::Error::ResetCard | pcsc::Error::NoSmartcard => {
            TransportError::CardRemoved
        }
        pcsc::Error::Timeout => TransportError::Timeout,
        pcsc::Error::Cancelled => TransportError::Cancelled,
        pcsc::Error::ReaderUnavailable | pcsc::Error::UnknownReader | pcsc::Error::NoService => {
            TransportError::Connection
        }
        e => TransportError::driver(e as u32 as i32),
    }
}
