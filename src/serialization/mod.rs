//! Wire formats: the libmacaroons-compatible V1 packet encoding, the tagged
//! V2 encoding, and the two JSON shapes, plus the concatenated slice forms
//! used to transport a macaroon together with its discharges.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::{Macaroon, MacaroonError, Result};

pub mod json;
pub(crate) mod macaroon_builder;
pub(crate) mod packet;
pub mod v1;
pub mod v2;
pub mod v2json;

/// The binary wire format a macaroon was decoded from or will encode to.
/// A serialization attribute only; it does not take part in equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    V1,
    V2,
}

/// Decode one binary macaroon from the front of `data`, returning it along
/// with the remaining bytes. V2 announces itself with a leading `0x02`;
/// anything else is taken for V1, whose first byte is an ascii hex digit.
pub(crate) fn deserialize_prefix(data: &[u8]) -> Result<(Macaroon, &[u8])> {
    match data.first() {
        Some(&0x02) => v2::deserialize_prefix(data),
        Some(_) => v1::deserialize_prefix(data),
        None => Err(MacaroonError::malformed("empty input")),
    }
}

/// Encode a macaroon slice as the concatenation of the members' binary
/// forms, each in its own format. By convention the first member is the
/// primary macaroon and the rest are its discharges.
pub fn serialize_slice(macaroons: &[Macaroon]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for macaroon in macaroons {
        data.extend(macaroon.serialize(macaroon.format())?);
    }
    Ok(data)
}

/// Decode a concatenated binary slice. The members are not delimited; each
/// macaroon is decoded and the cursor advanced past the bytes it consumed
/// until the input is exhausted. Partial trailing data fails with
/// [`TrailingGarbage`](MacaroonError::TrailingGarbage).
pub fn deserialize_slice(data: &[u8]) -> Result<Vec<Macaroon>> {
    let mut macaroons = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        match deserialize_prefix(rest) {
            Ok((macaroon, remaining)) => {
                macaroons.push(macaroon);
                rest = remaining;
            }
            Err(err) if macaroons.is_empty() => return Err(err),
            Err(_) => return Err(MacaroonError::TrailingGarbage),
        }
    }
    Ok(macaroons)
}

/// Decode either JSON shape, distinguished by the version discriminator
/// the compact shape carries.
pub(crate) fn deserialize_json_any(data: &[u8]) -> Result<Macaroon> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    if value.get("v").is_some() {
        v2json::from_value(value)
    } else {
        json::from_value(value)
    }
}

/// Decode base64 produced by any known macaroon implementation: standard or
/// URL-safe alphabet, with or without padding.
pub(crate) fn base64_decode_any(encoded: &str) -> Result<Vec<u8>> {
    for engine in [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD] {
        if let Ok(decoded) = engine.decode(encoded) {
            return Ok(decoded);
        }
    }
    Err(URL_SAFE_NO_PAD.decode(encoded).unwrap_err().into())
}

#[cfg(test)]
mod tests {
    use super::base64_decode_any;

    #[test]
    fn base64_all_alphabets() {
        // 0xfb 0xef 0xbe encodes to "++++" standard, "----" url-safe
        assert_eq!(base64_decode_any("+++/").unwrap(), vec![0xfb, 0xef, 0xbf]);
        assert_eq!(base64_decode_any("---_").unwrap(), vec![0xfb, 0xef, 0xbf]);
        // padded and unpadded
        assert_eq!(base64_decode_any("YQ==").unwrap(), b"a");
        assert_eq!(base64_decode_any("YQ").unwrap(), b"a");
        assert!(base64_decode_any("!!!").is_err());
    }
}
