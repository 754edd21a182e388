//! Commands for basic card operations

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::utils::{self, session::Card};

/// Read EF.Version2 and report whether the card speaks PACE
pub(crate) fn version_command(mut card: Card, can: Option<&str>) -> anyhow::Result<()> {
    if can.is_some() {
        utils::session::establish(&mut card, can)?;
    }
    let version = card.read_version()?;

    println!(
        "Object system version: {}",
        hex::encode_upper(version.object_system_version())
    );
    match version.is_health_card_version2() {
        Ok(true) => println!("Generation 2 card, PACE supported"),
        Ok(false) => println!("Card predates generation 2, PACE not supported"),
        Err(e) => println!("Version field unreadable: {e}"),
    }
    Ok(())
}

/// Establish PACE and report success
pub(crate) fn pace_command(mut card: Card, can: Option<&str>) -> anyhow::Result<()> {
    utils::session::establish(&mut card, can)?;
    println!("PACE channel established, secure messaging active");
    Ok(())
}

/// Print random bytes generated by the card
pub(crate) fn random_command(
    mut card: Card,
    can: Option<&str>,
    length: usize,
) -> anyhow::Result<()> {
    utils::session::establish(&mut card, can)?;
    let random = card.get_random(length)?;
    if random.is_empty() {
        anyhow::bail!("card withheld the challenge: security status not satisfied");
    }
    println!("{}", hex::encode_upper(&random));
    Ok(())
}

/// Read the authentication certificate
pub(crate) fn certificate_command(
    mut card: Card,
    can: Option<&str>,
    output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    utils::session::establish(&mut card, can)?;
    let certificate = card.retrieve_certificate()?;
    info!(length = certificate.len(), "Certificate read");

    match output {
        Some(path) => {
            fs::write(path, &certificate)?;
            println!("Certificate written to {}", path.display());
        }
        None => println!("{}", hex::encode_upper(&certificate)),
    }
    Ok(())
}

/// Sign a hex challenge with the authentication key
pub(crate) fn sign_command(
    mut card: Card,
    can: Option<&str>,
    challenge: &str,
) -> anyhow::Result<()> {
    let challenge = utils::parse_hex(challenge)?;
    utils::session::establish(&mut card, can)?;
    let signature = card.sign_challenge(&challenge)?;
    println!("{}", hex::encode_upper(&signature));
    Ok(())
}
