//! Commands for PIN management

use anyhow::bail;
use egk_healthcard::PinOutcome;

use crate::utils::{self, session::Card};

fn report(outcome: PinOutcome) -> anyhow::Result<()> {
    match outcome {
        PinOutcome::Verified => {
            println!("PIN accepted");
            Ok(())
        }
        PinOutcome::WrongSecret { retries_left } => {
            bail!("Wrong PIN, {retries_left} attempts left")
        }
        PinOutcome::Blocked => bail!("PIN blocked, unlock the card with the PUK"),
    }
}

/// Verify the home PIN
pub(crate) fn verify_pin_command(
    mut card: Card,
    can: Option<&str>,
    pin: Option<&str>,
) -> anyhow::Result<()> {
    utils::session::establish(&mut card, can)?;
    let pin = utils::value_or_prompt(pin, "PIN")?;
    report(card.verify_pin(&pin)?)
}

/// Change the home PIN
pub(crate) fn change_pin_command(
    mut card: Card,
    can: Option<&str>,
    old: Option<&str>,
    new: Option<&str>,
) -> anyhow::Result<()> {
    utils::session::establish(&mut card, can)?;
    let old = utils::value_or_prompt(old, "Current PIN")?;
    let new = utils::value_or_prompt(new, "New PIN")?;
    report(card.change_pin(&old, &new)?)
}

/// Reset the retry counter, optionally setting a new PIN
pub(crate) fn unlock_command(
    mut card: Card,
    can: Option<&str>,
    puk: Option<&str>,
    new_pin: Option<&str>,
) -> anyhow::Result<()> {
    utils::session::establish(&mut card, can)?;
    let puk = utils::value_or_prompt(puk, "PUK")?;
    card.unlock_card(&puk, new_pin)?;
    println!("Card unlocked");
    Ok(())
}
