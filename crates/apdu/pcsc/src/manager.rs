//! Device manager for PC/SC operations

use std::time::{Duration, Instant};

use pcsc::{Context, ReaderState, Scope, State};
use tracing::{debug, trace};

use crate::config::{ConnectStrategy, PcscConfig};
use crate::error::PcscError;
use crate::reader::{PcscReader, card_in};
use crate::transport::PcscTransport;
use crate::util::match_atr;

/// Manager for PC/SC device operations
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    /// PC/SC context
    context: Context,
}

impl PcscDeviceManager {
    /// Create a new PC/SC device manager
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    fn reader_states(&self) -> Result<Vec<ReaderState>, PcscError> {
        let readers = match self.context.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        Ok(readers
            .into_iter()
            .map(|name| ReaderState::new(name, State::UNAWARE))
            .collect())
    }

    /// List all available card readers with card presence and ATR
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let mut states = self.reader_states()?;
        self.context.get_status_change(None, &mut states)?;
        Ok(states.iter().map(PcscReader::from_reader_state).collect())
    }

    /// Block until a card shows up in any reader, or `timeout` elapses
    pub fn wait_for_card(&self, timeout: Duration) -> Result<PcscReader, PcscError> {
        let deadline = Instant::now() + timeout;
        let mut states = self.reader_states()?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.context.get_status_change(Some(remaining), &mut states) {
                Ok(()) => {}
                Err(pcsc::Error::Timeout) => return Err(PcscError::WaitTimeout),
                Err(e) => return Err(e.into()),
            }

            if let Some(state) = states.iter().find(|s| card_in(s.event_state())) {
                let reader = PcscReader::from_reader_state(state);
                debug!(reader = reader.name(), "Card detected");
                return Ok(reader);
            }
            trace!(?remaining, "No card yet");
            for state in &mut states {
                state.sync_current_state();
            }
        }
    }

    /// Open a connection to a specific reader
    pub fn open_reader(&self, reader_name: &str) -> Result<PcscTransport, PcscError> {
        self.open_reader_with_config(reader_name, PcscConfig::default())
    }

    /// Open a connection to a specific reader with custom configuration
    pub fn open_reader_with_config(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTransport, PcscError> {
        PcscTransport::connect(self.context.clone(), reader_name, config)
    }

    /// Connect to a reader using the specified strategy
    pub fn connect_strategy(
        &self,
        strategy: ConnectStrategy,
        config: PcscConfig,
    ) -> Result<PcscTransport, PcscError> {
        if let ConnectStrategy::Reader(name) = &strategy {
            return self.open_reader_with_config(name, config);
        }
        let readers = self.list_readers()?;

        let chosen = match &strategy {
            ConnectStrategy::AnyCard => readers.iter().find(|r| r.has_card()),
            ConnectStrategy::CardWithAtr(pattern, mask) => readers.iter().find(|r| {
                r.atr()
                    .is_some_and(|atr| match_atr(atr, pattern, mask.as_deref()))
            }),
            _ => readers.first(),
        };

        match chosen {
            Some(reader) => self.open_reader_with_config(reader.name(), config),
            None if matches!(strategy, ConnectStrategy::CardWithAtr(..)) => Err(PcscError::NoCard(
                "no card with matching ATR".to_owned(),
            )),
            None => Err(PcscError::NoCard("no reader holds a card".to_owned())),
        }
    }
}
