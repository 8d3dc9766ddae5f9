//! V2 binary format: a `0x02` version byte, then varint-length-prefixed
//! fields tagged with a single type byte, in sections closed by a zero
//! end-of-section marker,
//!
//! ```text
//! 0x02
//! [ location ] identifier EOS
//! ( [ cl ] [ vid ] cid EOS )*
//! EOS
//! signature
//! ```

use crate::caveat::{Caveat, CaveatBuilder};
use crate::crypto::key::MacaroonKey;
use crate::serialization::macaroon_builder::MacaroonBuilder;
use crate::serialization::Format;
use crate::{Macaroon, MacaroonError, Result};

const VERSION: u8 = 2;

const EOS: u8 = 0;
const FIELD_LOCATION: u8 = 1;
const FIELD_IDENTIFIER: u8 = 2;
const FIELD_VID: u8 = 4;
const FIELD_CL: u8 = 5;
const FIELD_SIGNATURE: u8 = 6;

fn append_varint(buffer: &mut Vec<u8>, mut value: usize) {
    while value >= 0x80 {
        buffer.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    buffer.push(value as u8);
}

fn append_field(buffer: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    buffer.push(tag);
    append_varint(buffer, payload.len());
    buffer.extend_from_slice(payload);
}

pub fn serialize(macaroon: &Macaroon) -> Result<Vec<u8>> {
    let mut buffer = vec![VERSION];
    if let Some(ref location) = macaroon.location {
        append_field(&mut buffer, FIELD_LOCATION, location.as_bytes());
    }
    append_field(&mut buffer, FIELD_IDENTIFIER, macaroon.identifier.as_ref());
    buffer.push(EOS);
    for caveat in macaroon.caveats() {
        match caveat {
            Caveat::FirstParty(fp) => {
                append_field(&mut buffer, FIELD_IDENTIFIER, fp.predicate().as_ref());
            }
            Caveat::ThirdParty(tp) => {
                if !tp.location().is_empty() {
                    append_field(&mut buffer, FIELD_CL, tp.location().as_bytes());
                }
                append_field(&mut buffer, FIELD_VID, tp.verifier_id().as_ref());
                append_field(&mut buffer, FIELD_IDENTIFIER, tp.id().as_ref());
            }
        }
        buffer.push(EOS);
    }
    buffer.push(EOS);
    append_field(&mut buffer, FIELD_SIGNATURE, macaroon.signature.as_ref());
    Ok(buffer)
}

pub fn deserialize(data: &[u8]) -> Result<Macaroon> {
    let (macaroon, rest) = deserialize_prefix(data)?;
    if !rest.is_empty() {
        return Err(MacaroonError::TrailingGarbage);
    }
    Ok(macaroon)
}

struct V2Deserializer<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> V2Deserializer<'a> {
    fn new(data: &'a [u8]) -> V2Deserializer<'a> {
        V2Deserializer { data, index: 0 }
    }

    fn get_byte(&mut self) -> Result<u8> {
        let byte = self
            .data
            .get(self.index)
            .copied()
            .ok_or_else(|| MacaroonError::malformed("unexpected end of input"))?;
        self.index += 1;
        Ok(byte)
    }

    fn get_eos(&mut self) -> Result<()> {
        match self.get_byte()? {
            EOS => Ok(()),
            tag => Err(MacaroonError::malformed(format!(
                "expected end of section, got tag {}",
                tag
            ))),
        }
    }

    fn get_field(&mut self) -> Result<&'a [u8]> {
        let size = self.get_field_size()?;
        if size > self.data.len() - self.index {
            return Err(MacaroonError::malformed("field length past end of input"));
        }
        let field = &self.data[self.index..self.index + size];
        self.index += size;
        Ok(field)
    }

    fn get_field_size(&mut self) -> Result<usize> {
        let mut size: u64 = 0;
        let mut shift = 0;
        while shift <= 63 {
            let byte = self.get_byte()?;
            size |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return usize::try_from(size)
                    .map_err(|_| MacaroonError::malformed("varint field length overflow"));
            }
            shift += 7;
        }
        Err(MacaroonError::malformed("varint field length overflow"))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.index..]
    }
}

/// Decode one macaroon from the front of `data`, returning the rest.
pub(crate) fn deserialize_prefix(data: &[u8]) -> Result<(Macaroon, &[u8])> {
    let mut builder = MacaroonBuilder::new(Format::V2);
    let mut deserializer = V2Deserializer::new(data);
    if deserializer.get_byte()? != VERSION {
        return Err(MacaroonError::malformed("unsupported version number"));
    }

    let mut tag = deserializer.get_byte()?;
    if tag == FIELD_LOCATION {
        let location = deserializer.get_field()?;
        builder.set_location(utf8_field(location, "location")?);
        tag = deserializer.get_byte()?;
    }
    if tag != FIELD_IDENTIFIER {
        return Err(MacaroonError::malformed("identifier not found"));
    }
    builder.set_identifier(deserializer.get_field()?.into());
    deserializer.get_eos()?;

    loop {
        let mut tag = deserializer.get_byte()?;
        if tag == EOS {
            break;
        }
        let mut caveat = CaveatBuilder::new();
        if tag == FIELD_CL {
            caveat.add_location(utf8_field(deserializer.get_field()?, "cl")?);
            tag = deserializer.get_byte()?;
        }
        if tag == FIELD_VID {
            caveat.add_verifier_id(deserializer.get_field()?.into());
            tag = deserializer.get_byte()?;
        }
        if tag != FIELD_IDENTIFIER {
            return Err(MacaroonError::malformed("caveat identifier not found"));
        }
        caveat.add_id(deserializer.get_field()?.into());
        deserializer.get_eos()?;
        builder.add_caveat(caveat.build()?);
    }

    if deserializer.get_byte()? != FIELD_SIGNATURE {
        return Err(MacaroonError::malformed("signature not found"));
    }
    let signature = deserializer.get_field()?;
    let signature = MacaroonKey::from_slice(signature).ok_or_else(|| {
        MacaroonError::malformed(format!(
            "signature has unexpected length {}",
            signature.len()
        ))
    })?;
    builder.set_signature(signature);
    Ok((builder.build()?, deserializer.rest()))
}

fn utf8_field<'a>(payload: &'a [u8], which: &'static str) -> Result<&'a str> {
    std::str::from_utf8(payload)
        .map_err(|_| MacaroonError::malformed(format!("{} is not valid utf-8", which)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    // location "http://example.org/", identifier "keyid", first-party
    // caveats "account = 3735928559" and "user = alice".
    const SERIALIZED: &str = "AgETaHR0cDovL2V4YW1wbGUub3JnLwIFa2V5aWQAAhRhY2NvdW50ID0gMzczNTkyODU1OQACDHVzZXIgPSBhbGljZQAABiBL6WfNHqDGsmuvakqU7psFsViG2guoXoxCqTyNDhJe_A==";
    const SIGNATURE: [u8; 32] = [
        75, 233, 103, 205, 30, 160, 198, 178, 107, 175, 106, 74, 148, 238, 155, 5, 177, 88, 134,
        218, 11, 168, 94, 140, 66, 169, 60, 141, 14, 18, 94, 252,
    ];

    fn decode_base64(data: &str) -> Vec<u8> {
        STANDARD.decode(data.replace('_', "/").replace('-', "+")).unwrap()
    }

    #[test]
    fn deserialize_known_token() {
        let macaroon = deserialize(&decode_base64(SERIALIZED)).unwrap();
        assert_eq!(macaroon.location(), Some("http://example.org/".into()));
        assert_eq!(macaroon.identifier(), "keyid".into());
        assert_eq!(macaroon.caveats().len(), 2);
        assert_eq!(macaroon.caveats()[0].id(), &"account = 3735928559".into());
        assert_eq!(macaroon.caveats()[1].id(), &"user = alice".into());
        assert_eq!(macaroon.signature(), SIGNATURE.into());
        assert_eq!(macaroon.format(), Format::V2);
    }

    #[test]
    fn serialize_known_token() {
        let mut builder = MacaroonBuilder::new(Format::V2);
        builder.set_location("http://example.org/");
        builder.set_identifier("keyid".into());
        builder.set_signature(SIGNATURE.into());
        for predicate in ["account = 3735928559", "user = alice"] {
            let mut caveat = CaveatBuilder::new();
            caveat.add_id(predicate.into());
            builder.add_caveat(caveat.build().unwrap());
        }
        let macaroon = builder.build().unwrap();
        assert_eq!(serialize(&macaroon).unwrap(), decode_base64(SERIALIZED));
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
            .add_third_party_caveat("http://auth.mybank/", b"other key", "other keyid".into())
            .unwrap();
        macaroon.add_first_party_caveat("user = alice".into()).unwrap();

        let data = serialize(&macaroon).unwrap();
        let decoded = deserialize(&data).unwrap();
        assert_eq!(decoded, macaroon);
        assert_eq!(serialize(&decoded).unwrap(), data);
    }

    #[test]
    fn round_trip_without_location() {
        let macaroon = Macaroon::create(None, b"this is the key", "keyid".into()).unwrap();
        let data = serialize(&macaroon).unwrap();
        assert_eq!(data[1], FIELD_IDENTIFIER);
        let decoded = deserialize(&data).unwrap();
        assert_eq!(decoded.location(), None);
        assert_eq!(decoded, macaroon);
    }

    #[test]
    fn varint_encoding() {
        let mut buffer = Vec::new();
        append_varint(&mut buffer, 0);
        assert_eq!(buffer, [0]);

        let mut buffer = Vec::new();
        append_varint(&mut buffer, 0x7f);
        assert_eq!(buffer, [0x7f]);

        let mut buffer = Vec::new();
        append_varint(&mut buffer, 0x80);
        assert_eq!(buffer, [0x80, 0x01]);

        let mut buffer = Vec::new();
        append_varint(&mut buffer, 300);
        assert_eq!(buffer, [0xac, 0x02]);
    }

    #[test]
    fn varint_length_field_round_trip() {
        let mut macaroon = Macaroon::create(None, b"key", "keyid".into()).unwrap();
        macaroon
            .add_first_party_caveat(vec![b'x'; 300].into())
            .unwrap();
        let data = serialize(&macaroon).unwrap();
        assert_eq!(deserialize(&data).unwrap(), macaroon);
    }

    #[test]
    fn rejects_wrong_version() {
        assert!(deserialize(&[3, 2, 5, b'k', b'e', b'y', b'i', b'd', 0]).is_err());
    }

    #[test]
    fn rejects_truncation_everywhere() {
        let data = decode_base64(SERIALIZED);
        for len in 0..data.len() {
            assert!(deserialize(&data[..len]).is_err(), "truncated at {}", len);
        }
    }

    #[test]
    fn rejects_field_length_past_input() {
        // version, identifier tag, varint length 100, no payload
        assert!(deserialize(&[2, 2, 100]).is_err());
    }

    #[test]
    fn rejects_unterminated_varint() {
        let mut data = vec![2, 2];
        data.extend_from_slice(&[0x80; 12]);
        assert!(deserialize(&data).is_err());
    }

    #[test]
    fn rejects_caveat_location_without_vid() {
        let mut data = vec![2];
        append_field(&mut data, FIELD_IDENTIFIER, b"keyid");
        data.push(EOS);
        append_field(&mut data, FIELD_CL, b"http://auth.mybank/");
        append_field(&mut data, FIELD_IDENTIFIER, b"other keyid");
        data.push(EOS);
        data.push(EOS);
        append_field(&mut data, FIELD_SIGNATURE, &[0; 32]);
        assert!(deserialize(&data).is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut data = decode_base64(SERIALIZED);
        data.push(0);
        assert!(matches!(
            deserialize(&data).unwrap_err(),
            MacaroonError::TrailingGarbage
        ));
    }
}
