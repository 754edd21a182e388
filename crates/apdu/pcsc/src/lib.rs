//! PC/SC transport for APDU exchange
//!
//! Implements [`CardTransport`](egk_apdu_core::CardTransport) on top of the
//! system PC/SC service, contactless readers included. Each transceive is
//! preceded by a bounded presence poll and limited by an I/O timeout; a failed
//! transceive closes the channel.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//!
//! use egk_apdu_core::{CardExecutor, Command, Executor};
//! use egk_apdu_transport_pcsc::{PcscConfig, PcscDeviceManager};
//!
//! let manager = PcscDeviceManager::new()?;
//! let reader = manager.wait_for_card(Duration::from_secs(30))?;
//! println!("Card in {}", reader.name());
//!
//! let config = PcscConfig::new().with_io_timeout(Duration::from_secs(2));
//! let transport = manager.open_reader_with_config(reader.name(), config)?;
//! let mut executor = CardExecutor::new(transport);
//!
//! let response = executor.transmit(&Command::new(0x00, 0xA4, 0x04, 0x0C))?;
//! println!("Status: {}", response.status());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod transport;
mod util;

pub use config::{ConnectStrategy, PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
