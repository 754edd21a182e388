//! PC/SC transport implementation
//!
//! The card handle lives on a worker thread. Every transceive is handed over a
//! channel and waited for with the configured I/O timeout, so a reader that
//! stops answering cannot block the caller forever.

use std::ffi::CString;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use egk_apdu_core::{CancelHandle, CardTransport, PresencePolicy, TransportError};
use pcsc::{Card, Context, Disposition, ReaderState, State};
use tracing::{debug, warn};

use crate::config::PcscConfig;
use crate::error::{PcscError, driver_error};
use crate::reader::card_in;
use crate::util::atr_supports_extended_length;

enum Request {
    Transmit(Bytes),
    Disconnect(Disposition),
}

type Reply = Result<Bytes, pcsc::Error>;

/// Handle to the thread that owns the card
struct Worker {
    requests: Sender<Request>,
    replies: Receiver<Reply>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(card: Card) -> Result<Self, PcscError> {
        let (requests, inbox) = bounded(1);
        let (outbox, replies) = bounded(1);
        let handle = thread::Builder::new()
            .name("pcsc-card".into())
            .spawn(move || serve(card, &inbox, &outbox))
            .map_err(|_| PcscError::WorkerStopped)?;

        Ok(Self {
            requests,
            replies,
            handle,
        })
    }

    fn transmit(&self, command: &[u8], timeout: Duration) -> Result<Bytes, PcscError> {
        self.requests
            .send(Request::Transmit(Bytes::copy_from_slice(command)))
            .map_err(|_| PcscError::WorkerStopped)?;

        match self.replies.recv_timeout(timeout) {
            Ok(reply) => reply.map_err(|e| match e {
                pcsc::Error::RemovedCard | pcsc::Error::ResetCard => PcscError::CardRemoved,
                e => e.into(),
            }),
            Err(RecvTimeoutError::Timeout) => Err(PcscError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(PcscError::WorkerStopped),
        }
    }

    /// Ask the worker to release the card
    ///
    /// A worker stuck in the driver is left behind instead of joined.
    fn stop(self, disposition: Disposition, join: bool) {
        let _ = self.requests.try_send(Request::Disconnect(disposition));
        drop(self.requests);
        if join && self.handle.join().is_err() {
            warn!("Card worker panicked");
        }
    }
}

fn serve(card: Card, requests: &Receiver<Request>, replies: &Sender<Reply>) {
    let mut buffer = vec![0; pcsc::MAX_BUFFER_SIZE_EXTENDED];
    let mut disposition = Disposition::LeaveCard;

    for request in requests {
        match request {
            Request::Transmit(command) => {
                let reply = card
                    .transmit(&command, &mut buffer)
                    .map(Bytes::copy_from_slice);
                if replies.send(reply).is_err() {
                    break;
                }
            }
            Request::Disconnect(requested) => {
                disposition = requested;
                break;
            }
        }
    }

    if let Err((_, e)) = card.disconnect(disposition) {
        debug!(error = %e, "Card disconnect failed");
    }
}

/// Transport implementation using PC/SC
///
/// Any timeout, removal or driver failure during a transceive closes the
/// channel; every later call fails with [`TransportError::Closed`] until
/// [`CardTransport::reset`] connects again.
pub struct PcscTransport {
    context: Context,
    reader: CString,
    config: PcscConfig,
    worker: Option<Worker>,
    atr: Vec<u8>,
    extended_length: bool,
    cancel: CancelHandle,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .field("connected", &self.worker.is_some())
            .field("extended_length", &self.extended_length)
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransport {
    /// Connect to the card in the named reader
    pub(crate) fn connect(
        context: Context,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<Self, PcscError> {
        let reader = CString::new(reader_name)
            .map_err(|_| PcscError::ReaderNotFound(reader_name.to_owned()))?;

        let mut transport = Self {
            context,
            reader,
            config,
            worker: None,
            atr: Vec::new(),
            extended_length: false,
            cancel: CancelHandle::new(),
        };
        transport.open()?;
        Ok(transport)
    }

    fn open(&mut self) -> Result<(), PcscError> {
        let card = match self.context.connect(
            &self.reader,
            self.config.share_mode.into(),
            self.config.protocols,
        ) {
            Ok(card) => card,
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                return Err(PcscError::NoCard(self.reader_name()));
            }
            Err(pcsc::Error::UnknownReader) => {
                return Err(PcscError::ReaderNotFound(self.reader_name()));
            }
            Err(e) => return Err(e.into()),
        };

        self.atr = card.get_attribute_owned(pcsc::Attribute::AtrString)?;
        self.extended_length = self
            .config
            .extended_length
            .unwrap_or_else(|| atr_supports_extended_length(&self.atr));
        debug!(
            reader = %self.reader_name(),
            extended_length = self.extended_length,
            "Connected to card"
        );

        self.worker = Some(Worker::spawn(card)?);
        Ok(())
    }

    fn shut_down(&mut self, disposition: Disposition, join: bool) {
        if let Some(worker) = self.worker.take() {
            debug!(reader = %self.reader_name(), "Closing card channel");
            worker.stop(disposition, join);
        }
    }

    /// ATR of the connected card
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Name of the reader this transport talks to
    pub fn reader_name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }

    /// Configuration the transport was opened with
    pub const fn config(&self) -> &PcscConfig {
        &self.config
    }
}

impl CardTransport for PcscTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let Some(worker) = &self.worker else {
            return Err(TransportError::Closed);
        };

        let result = worker.transmit(command, self.config.io_timeout);
        if let Err(e) = &result {
            warn!(error = %e, "Card channel failed, closing");
            let stuck = matches!(e, PcscError::Timeout);
            self.shut_down(Disposition::LeaveCard, !stuck);
        }
        result.map_err(Into::into)
    }

    fn is_card_present(&mut self) -> Result<bool, TransportError> {
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];
        match self
            .context
            .get_status_change(Some(Duration::ZERO), &mut states)
        {
            Ok(()) => Ok(card_in(states[0].event_state())),
            Err(pcsc::Error::Timeout) => Ok(false),
            Err(e) => Err(driver_error(e)),
        }
    }

    fn presence_policy(&self) -> PresencePolicy {
        self.config.presence_policy
    }

    fn supports_extended_length(&self) -> bool {
        self.extended_length
    }

    fn cancel_handle(&self) -> Option<&CancelHandle> {
        Some(&self.cancel)
    }

    fn close(&mut self) {
        self.shut_down(Disposition::LeaveCard, true);
    }

    fn is_connected(&self) -> bool {
        self.worker.is_some()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.shut_down(Disposition::ResetCard, true);
        self.open().map_err(Into::into)
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        self.close();
    }
}
