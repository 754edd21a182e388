//! PACE parameters advertised in EF.CardAccess

use crate::ec::BrainpoolCurve;
use crate::error::{CapabilityError, Error, ProtocolError};
use crate::tlv::TlvReader;

/// id-PACE-ECDH-GM-AES-CBC-CMAC-128, 0.4.0.127.0.7.2.2.4.2.2
pub const ID_PACE_ECDH_GM_AES_CBC_CMAC_128: [u8; 10] =
    [0x04, 0x00, 0x7F, 0x00, 0x07, 0x02, 0x02, 0x04, 0x02, 0x02];

/// Prefix shared by all id-PACE object identifiers, 0.4.0.127.0.7.2.2.4
const ID_PACE_PREFIX: [u8; 8] = [0x04, 0x00, 0x7F, 0x00, 0x07, 0x02, 0x02, 0x04];

const TAG_SET: u32 = 0x31;
const TAG_SEQUENCE: u32 = 0x30;
const TAG_OID: u32 = 0x06;
const TAG_INTEGER: u32 = 0x02;

/// PACE protocol and domain parameters chosen from EF.CardAccess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaceInfo {
    curve: BrainpoolCurve,
    parameter_id: u64,
}

impl PaceInfo {
    /// Parameters for an explicit curve
    pub const fn new(curve: BrainpoolCurve) -> Self {
        Self {
            curve,
            parameter_id: curve.parameter_id(),
        }
    }

    /// Select the generic mapping entry from the SecurityInfos in EF.CardAccess
    pub fn parse(card_access: &[u8]) -> Result<Self, Error> {
        let set = TlvReader::expect(card_access, TAG_SET).map_err(ProtocolError::from)?;

        let mut unsupported = None;
        for info in TlvReader::new(set) {
            let info = info.map_err(ProtocolError::from)?;
            if info.tag != TAG_SEQUENCE {
                continue;
            }
            let mut fields = TlvReader::new(info.value);
            let Some(Ok(oid)) = fields.next() else {
                continue;
            };
            if oid.tag != TAG_OID || !oid.value.starts_with(&ID_PACE_PREFIX) {
                continue;
            }
            if oid.value != ID_PACE_ECDH_GM_AES_CBC_CMAC_128 {
                unsupported.get_or_insert(CapabilityError::MissingPaceInfo);
                continue;
            }

            // version INTEGER, then the optional parameterId INTEGER
            let integers = fields
                .filter_map(Result::ok)
                .filter(|f| f.tag == TAG_INTEGER)
                .map(|f| decode_integer(f.value))
                .collect::<Vec<_>>();
            let Some(Some(parameter_id)) = integers.get(1).copied() else {
                unsupported.get_or_insert(CapabilityError::MissingPaceInfo);
                continue;
            };
            match BrainpoolCurve::from_parameter_id(parameter_id) {
                Some(curve) => {
                    return Ok(Self {
                        curve,
                        parameter_id,
                    });
                }
                None => {
                    unsupported = Some(CapabilityError::UnsupportedParameterId(parameter_id));
                }
            }
        }

        Err(unsupported.unwrap_or(CapabilityError::MissingPaceInfo).into())
    }

    /// Negotiated curve
    pub const fn curve(&self) -> BrainpoolCurve {
        self.curve
    }

    /// Standardized domain parameter id
    pub const fn parameter_id(&self) -> u64 {
        self.parameter_id
    }

    /// Protocol object identifier, content octets only
    pub const fn protocol_id(&self) -> &'static [u8] {
        &ID_PACE_ECDH_GM_AES_CBC_CMAC_128
    }
}

fn decode_integer(value: &[u8]) -> Option<u64> {
    if value.is_empty() || value.len() > 8 {
        return None;
    }
    Some(value.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}
