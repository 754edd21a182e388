//! Utility functions for the eGK CLI

pub(crate) mod reader;
pub(crate) mod session;

use std::io::{self, Write};

use anyhow::Context;

/// Ask for a value on stdin
pub(crate) fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .with_context(|| format!("failed to read {label}"))?;
    Ok(input.trim().to_owned())
}

/// Use the given value or ask for it
pub(crate) fn value_or_prompt(value: Option<&str>, label: &str) -> anyhow::Result<String> {
    value.map_or_else(|| prompt(label), |v| Ok(v.to_owned()))
}

/// Decode a hex argument, tolerating a `0x` prefix
pub(crate) fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let digits = input.trim().trim_start_matches("0x");
    hex::decode(digits).with_context(|| format!("invalid hex: {input}"))
}
