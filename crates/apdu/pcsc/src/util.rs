//! ATR helpers

/// Match an ATR against a pattern with an optional mask
///
/// If a mask is provided, only the bits set in the mask are compared.
pub(crate) fn match_atr(atr: &[u8], pattern: &[u8], mask: Option<&[u8]>) -> bool {
    if pattern.len() > atr.len() {
        return false;
    }

    match mask {
        Some(mask) if mask.len() < pattern.len() => false,
        Some(mask) => atr
            .iter()
            .zip(pattern)
            .zip(mask)
            .all(|((a, p), m)| a & m == p & m),
        None => atr.starts_with(pattern),
    }
}

/// Historical bytes of an ATR, skipping TS, T0 and the interface bytes
fn historical_bytes(atr: &[u8]) -> Option<&[u8]> {
    let t0 = *atr.get(1)?;
    let count = usize::from(t0 & 0x0F);

    let mut indicator = t0 >> 4;
    let mut index = 2;
    loop {
        // TA, TB, TC and TD presence bits
        index += indicator.count_ones() as usize;
        if indicator & 0x08 == 0 {
            break;
        }
        indicator = *atr.get(index - 1)? >> 4;
    }

    atr.get(index..index + count)
}

/// Whether the card capabilities in the ATR announce extended Lc and Le fields
///
/// Looks for the compact-TLV card capabilities object (tag 7) in the
/// historical bytes and tests bit 0x40 of its third byte.
pub(crate) fn atr_supports_extended_length(atr: &[u8]) -> bool {
    let Some(historical) = historical_bytes(atr) else {
        return false;
    };
    let objects = match historical.split_first() {
        Some((0x80, objects)) => objects,
        // category 00 ends with a three byte status indicator
        Some((0x00, objects)) => &objects[..objects.len().saturating_sub(3)],
        _ => return false,
    };

    let mut rest = objects;
    while let Some((&header, tail)) = rest.split_first() {
        let length = usize::from(header & 0x0F);
        let Some(value) = tail.get(..length) else {
            return false;
        };
        if header >> 4 == 0x7 {
            return value.get(2).is_some_and(|b| b & 0x40 != 0);
        }
        rest = &tail[length..];
    }
    false
}
