//! Reader representation for PC/SC devices

use pcsc::{ReaderState, State};

use crate::util::atr_supports_extended_length;

/// Snapshot of a PC/SC card reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    name: String,
    has_card: bool,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Create a new reader
    pub const fn new(name: String, has_card: bool, atr: Option<Vec<u8>>) -> Self {
        Self {
            name,
            has_card,
            atr,
        }
    }

    /// Get the reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a card is present in the reader
    pub const fn has_card(&self) -> bool {
        self.has_card
    }

    /// Get the ATR of the card if present
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    /// Whether the card's ATR announces extended length APDUs
    pub fn supports_extended_length(&self) -> bool {
        self.atr().is_some_and(atr_supports_extended_length)
    }

    pub(crate) fn from_reader_state(reader_state: &ReaderState) -> Self {
        let has_card = card_in(reader_state.event_state());
        let atr = has_card.then(|| reader_state.atr().to_vec());

        Self {
            name: reader_state.name().to_string_lossy().into_owned(),
            has_card,
            atr,
        }
    }
}

/// Whether a reader state reports a card in the slot or field
pub(crate) fn card_in(state: State) -> bool {
    state.contains(State::PRESENT) && !state.contains(State::EMPTY)
}
