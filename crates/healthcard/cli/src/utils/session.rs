//! Session management for the eGK CLI

use egk_apdu_core::CardTransport;
use egk_apdu_transport_pcsc::{PcscConfig, PcscDeviceManager, PcscReader, PcscTransport};
use egk_healthcard::HealthCard;
use tracing::debug;

use crate::utils::prompt;

/// Card session on a PC/SC reader
pub(crate) type Card = HealthCard<PcscTransport>;

/// Connect to the card in `reader`
pub(crate) fn open_card(manager: &PcscDeviceManager, reader: &PcscReader) -> anyhow::Result<Card> {
    let transport = manager.open_reader_with_config(reader.name(), PcscConfig::default())?;
    debug!(
        extended_length = transport.supports_extended_length(),
        "Transport opened"
    );
    Ok(HealthCard::new(transport))
}

/// Run PACE, asking for the CAN when it was not given
pub(crate) fn establish(card: &mut Card, can: Option<&str>) -> anyhow::Result<()> {
    let can = match can {
        Some(can) => can.to_owned(),
        None => prompt("CAN")?,
    };
    card.establish_secure_channel(&can, &mut rand::rng())?;
    Ok(())
}
