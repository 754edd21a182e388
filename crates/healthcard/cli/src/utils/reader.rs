use std::time::Duration;

use anyhow::{Context, bail};
use egk_apdu_transport_pcsc::{PcscDeviceManager, PcscReader};

/// Find a reader with a specific name
pub(crate) fn find_reader_by_name(
    manager: &PcscDeviceManager,
    reader_name: &str,
) -> anyhow::Result<PcscReader> {
    let readers = manager.list_readers()?;

    readers
        .into_iter()
        .find(|r| r.name() == reader_name)
        .with_context(|| format!("Reader '{reader_name}' not found"))
}

/// List all available readers
pub(crate) fn list_readers(manager: &PcscDeviceManager) -> anyhow::Result<()> {
    let readers = manager.list_readers()?;

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = match (reader.has_card(), reader.supports_extended_length()) {
            (false, _) => "no card",
            (true, false) => "card present",
            (true, true) => "card present, extended length",
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }

    Ok(())
}

/// Find a reader with a card inserted, waiting up to `wait` for one
pub(crate) fn find_reader_with_card(
    manager: &PcscDeviceManager,
    wait: Duration,
) -> anyhow::Result<PcscReader> {
    if !wait.is_zero() {
        println!("Waiting for a card...");
        return Ok(manager.wait_for_card(wait)?);
    }

    match manager.list_readers()?.into_iter().find(|r| r.has_card()) {
        Some(reader) => Ok(reader),
        None => bail!("No card found in any reader!"),
    }
}
