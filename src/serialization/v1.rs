//! V1 binary format: the macaroon fields as a flat run of packets,
//!
//! ```text
//! location
//! identifier
//! ( cid [ vid cl ] )*
//! signature
//! ```
//!
//! `vid` and `cl` appear together exactly when the caveat is third-party.

use crate::caveat::{Caveat, CaveatBuilder};
use crate::crypto::key::MacaroonKey;
use crate::serialization::macaroon_builder::MacaroonBuilder;
use crate::serialization::{packet, Format};
use crate::{Macaroon, MacaroonError, Result};

pub fn serialize(macaroon: &Macaroon) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let location = macaroon.location.as_deref().unwrap_or_default();
    packet::append(&mut data, packet::LOCATION, location.as_bytes())?;
    packet::append(&mut data, packet::IDENTIFIER, macaroon.identifier.as_ref())?;
    for caveat in macaroon.caveats() {
        match caveat {
            Caveat::FirstParty(fp) => {
                packet::append(&mut data, packet::CID, fp.predicate().as_ref())?;
            }
            Caveat::ThirdParty(tp) => {
                packet::append(&mut data, packet::CID, tp.id().as_ref())?;
                packet::append(&mut data, packet::VID, tp.verifier_id().as_ref())?;
                packet::append(&mut data, packet::CL, tp.location().as_bytes())?;
            }
        }
    }
    packet::append(&mut data, packet::SIGNATURE, macaroon.signature.as_ref())?;
    Ok(data)
}

pub fn deserialize(data: &[u8]) -> Result<Macaroon> {
    let (macaroon, rest) = deserialize_prefix(data)?;
    if !rest.is_empty() {
        return Err(MacaroonError::TrailingGarbage);
    }
    Ok(macaroon)
}

// Which caveat fields have been seen since the last flush.
enum CaveatState {
    Empty,
    HasCid(CaveatBuilder),
    HasVid(CaveatBuilder),
    Complete(CaveatBuilder),
}

/// Decode one macaroon from the front of `data`, returning the rest.
pub(crate) fn deserialize_prefix(data: &[u8]) -> Result<(Macaroon, &[u8])> {
    let mut builder = MacaroonBuilder::new(Format::V1);
    let mut rest = data;

    let location = expect_field(&mut rest, packet::LOCATION)?;
    builder.set_location(utf8_field(location, "location")?);
    let identifier = expect_field(&mut rest, packet::IDENTIFIER)?;
    builder.set_identifier(identifier.into());

    let mut state = CaveatState::Empty;
    loop {
        let p = packet::parse(rest)?;
        rest = &rest[p.total_len..];
        match p.field {
            field if field == packet::SIGNATURE.as_bytes() => {
                match state {
                    CaveatState::Empty => {}
                    CaveatState::HasCid(caveat) | CaveatState::Complete(caveat) => {
                        builder.add_caveat(caveat.build()?);
                    }
                    CaveatState::HasVid(_) => {
                        return Err(MacaroonError::malformed(
                            "caveat verification id without location",
                        ));
                    }
                }
                let signature = MacaroonKey::from_slice(p.payload).ok_or_else(|| {
                    MacaroonError::malformed(format!(
                        "signature has unexpected length {}",
                        p.payload.len()
                    ))
                })?;
                builder.set_signature(signature);
                return Ok((builder.build()?, rest));
            }
            field if field == packet::CID.as_bytes() => {
                match state {
                    CaveatState::Empty => {}
                    CaveatState::HasCid(caveat) | CaveatState::Complete(caveat) => {
                        builder.add_caveat(caveat.build()?);
                    }
                    CaveatState::HasVid(_) => {
                        return Err(MacaroonError::malformed(
                            "caveat verification id without location",
                        ));
                    }
                }
                let mut caveat = CaveatBuilder::new();
                caveat.add_id(p.payload.into());
                state = CaveatState::HasCid(caveat);
            }
            field if field == packet::VID.as_bytes() => match state {
                CaveatState::HasCid(mut caveat) => {
                    caveat.add_verifier_id(p.payload.into());
                    state = CaveatState::HasVid(caveat);
                }
                _ => {
                    return Err(MacaroonError::malformed(
                        "caveat verification id out of order",
                    ));
                }
            },
            field if field == packet::CL.as_bytes() => match state {
                CaveatState::HasVid(mut caveat) => {
                    caveat.add_location(utf8_field(p.payload, "cl")?);
                    state = CaveatState::Complete(caveat);
                }
                _ => {
                    return Err(MacaroonError::malformed("caveat location out of order"));
                }
            },
            field => {
                return Err(MacaroonError::malformed(format!(
                    "unexpected field {:?}",
                    String::from_utf8_lossy(field)
                )));
            }
        }
    }
}

fn expect_field<'a>(rest: &mut &'a [u8], kind: &str) -> Result<&'a [u8]> {
    let data = *rest;
    let p = packet::parse(data)?;
    if p.field != kind.as_bytes() {
        return Err(MacaroonError::malformed(format!(
            "unexpected field {:?}; expected {}",
            String::from_utf8_lossy(p.field),
            kind
        )));
    }
    *rest = &data[p.total_len..];
    Ok(p.payload)
}

fn utf8_field<'a>(payload: &'a [u8], which: &'static str) -> Result<&'a str> {
    std::str::from_utf8(payload)
        .map_err(|_| MacaroonError::malformed(format!("{} is not valid utf-8", which)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    // "location http://example.org/", "identifier keyid", no caveats.
    const SERIALIZED: &str = "MDAyMWxvY2F0aW9uIGh0dHA6Ly9leGFtcGxlLm9yZy8KMDAxNWlkZW50aWZpZXIga2V5aWQKMDAyZnNpZ25hdHVyZSB83ueSURxbxvUoSFgF3-myTnheKOKpkwH51xHGCeOO9wo";
    const SIGNATURE: [u8; 32] = [
        124, 222, 231, 146, 81, 28, 91, 198, 245, 40, 72, 88, 5, 223, 233, 178, 78, 120, 94, 40,
        226, 169, 147, 1, 249, 215, 17, 198, 9, 227, 142, 247,
    ];

    fn decode_base64(data: &str) -> Vec<u8> {
        URL_SAFE_NO_PAD.decode(data).unwrap()
    }

    #[test]
    fn deserialize_no_caveats() {
        let macaroon = deserialize(&decode_base64(SERIALIZED)).unwrap();
        assert_eq!(macaroon.location(), Some("http://example.org/".into()));
        assert_eq!(macaroon.identifier(), "keyid".into());
        assert_eq!(macaroon.caveats().len(), 0);
        assert_eq!(macaroon.signature(), SIGNATURE.into());
        assert_eq!(macaroon.format(), Format::V1);
    }

    #[test]
    fn deserialize_two_caveats() {
        let serialized = "MDAyMWxvY2F0aW9uIGh0dHA6Ly9leGFtcGxlLm9yZy8KMDAxNWlkZW50aWZpZXIga2V5aWQKMDAxZGNpZCBhY2NvdW50ID0gMzczNTkyODU1OQowMDE1Y2lkIHVzZXIgPSBhbGljZQowMDJmc2lnbmF0dXJlIEvpZ80eoMaya69qSpTumwWxWIbaC6hejEKpPI0OEl78Cg";
        let macaroon = deserialize(&decode_base64(serialized)).unwrap();
        assert_eq!(macaroon.location(), Some("http://example.org/".into()));
        assert_eq!(macaroon.identifier(), "keyid".into());
        assert_eq!(macaroon.caveats().len(), 2);
        assert_eq!(macaroon.caveats()[0].id(), &"account = 3735928559".into());
        assert_eq!(macaroon.caveats()[1].id(), &"user = alice".into());
        let expected: [u8; 32] = [
            75, 233, 103, 205, 30, 160, 198, 178, 107, 175, 106, 74, 148, 238, 155, 5, 177, 88,
            134, 218, 11, 168, 94, 140, 66, 169, 60, 141, 14, 18, 94, 252,
        ];
        assert_eq!(macaroon.signature(), expected.into());
    }

    #[test]
    fn round_trip_bytes() {
        let data = decode_base64(SERIALIZED);
        let macaroon = deserialize(&data).unwrap();
        assert_eq!(serialize(&macaroon).unwrap(), data);
    }

    #[test]
    fn round_trip_third_party() {
        let mut macaroon = Macaroon::create(
            Some("http://example.org/".into()),
            b"this is the key",
            "keyid".into(),
        )
        .unwrap();
        macaroon
            .add_first_party_caveat("account = 3735928559".into())
            .unwrap();
        macaroon
            .add_third_party_caveat("http://auth.mybank/", b"other key", "other keyid".into())
            .unwrap();

        let data = serialize(&macaroon).unwrap();
        let decoded = deserialize(&data).unwrap();
        assert_eq!(decoded, macaroon);
        assert_eq!(serialize(&decoded).unwrap(), data);
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut data = decode_base64(SERIALIZED);
        data.push(b'x');
        assert!(matches!(
            deserialize(&data).unwrap_err(),
            MacaroonError::TrailingGarbage
        ));
    }

    #[test]
    fn rejects_unknown_field() {
        let mut data = Vec::new();
        packet::append(&mut data, packet::LOCATION, b"loc").unwrap();
        packet::append(&mut data, packet::IDENTIFIER, b"id").unwrap();
        data.extend_from_slice(b"0010condition x\n");
        assert!(deserialize(&data).is_err());
    }

    #[test]
    fn rejects_misordered_caveat_fields() {
        let prefix = || {
            let mut data = Vec::new();
            packet::append(&mut data, packet::LOCATION, b"loc").unwrap();
            packet::append(&mut data, packet::IDENTIFIER, b"id").unwrap();
            data
        };

        // vid with no preceding cid
        let mut data = prefix();
        packet::append(&mut data, packet::VID, b"vid").unwrap();
        assert!(deserialize(&data).is_err());

        // cl directly after cid, without a vid
        let mut data = prefix();
        packet::append(&mut data, packet::CID, b"cid").unwrap();
        packet::append(&mut data, packet::CL, b"loc").unwrap();
        assert!(deserialize(&data).is_err());

        // vid not followed by cl
        let mut data = prefix();
        packet::append(&mut data, packet::CID, b"cid").unwrap();
        packet::append(&mut data, packet::VID, b"vid").unwrap();
        packet::append(&mut data, packet::SIGNATURE, &[0; 32]).unwrap();
        assert!(deserialize(&data).is_err());

        // repeated vid
        let mut data = prefix();
        packet::append(&mut data, packet::CID, b"cid").unwrap();
        packet::append(&mut data, packet::VID, b"vid").unwrap();
        packet::append(&mut data, packet::VID, b"vid").unwrap();
        assert!(deserialize(&data).is_err());
    }

    #[test]
    fn rejects_bad_signature_length() {
        let mut data = Vec::new();
        packet::append(&mut data, packet::LOCATION, b"loc").unwrap();
        packet::append(&mut data, packet::IDENTIFIER, b"id").unwrap();
        packet::append(&mut data, packet::SIGNATURE, &[0; 31]).unwrap();
        assert!(deserialize(&data).is_err());
    }

    #[test]
    fn rejects_reordered_header() {
        let mut data = Vec::new();
        packet::append(&mut data, packet::IDENTIFIER, b"id").unwrap();
        packet::append(&mut data, packet::LOCATION, b"loc").unwrap();
        packet::append(&mut data, packet::SIGNATURE, &[0; 32]).unwrap();
        assert!(deserialize(&data).is_err());
    }
}
