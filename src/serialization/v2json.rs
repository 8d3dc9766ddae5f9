//! The compact JSON shape that parallels the V2 binary layout:
//!
//! ```json
//! {"v":2,"l":"...","i":"...","c":[{"l":"...","i":"...","v64":"..."}],"s64":"..."}
//! ```
//!
//! Text fields use `i`/`l`; raw byte fields use their `64` twins holding
//! unpadded URL-safe base64 (`i64` when an identifier is not valid UTF-8,
//! `v64` and `s64` always). Carrying both a field and its twin is an error.

use serde::{Deserialize, Serialize};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::caveat::{Caveat, CaveatBuilder};
use crate::crypto::key::MacaroonKey;
use crate::serialization::macaroon_builder::MacaroonBuilder;
use crate::serialization::{base64_decode_any, Format};
use crate::{ByteString, Macaroon, MacaroonError, Result};

#[derive(Debug, Default, Deserialize, Serialize)]
struct CaveatJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    l: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    l64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v64: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Serialization {
    v: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    l: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    l64: Option<String>,
    #[serde(default)]
    c: Vec<CaveatJson>,
    s64: String,
}

impl Serialization {
    fn from_macaroon(macaroon: &Macaroon) -> Serialization {
        let (i, i64) = identifier_fields(&macaroon.identifier);
        let mut serialized = Serialization {
            v: 2,
            i,
            i64,
            l: macaroon.location.clone(),
            l64: None,
            c: Vec::with_capacity(macaroon.caveats().len()),
            s64: URL_SAFE_NO_PAD.encode(macaroon.signature.as_bytes()),
        };
        for caveat in macaroon.caveats() {
            serialized.c.push(match caveat {
                Caveat::FirstParty(fp) => {
                    let (i, i64) = identifier_fields(fp.predicate());
                    CaveatJson {
                        i,
                        i64,
                        l: None,
                        l64: None,
                        v64: None,
                    }
                }
                Caveat::ThirdParty(tp) => {
                    let (i, i64) = identifier_fields(tp.id());
                    CaveatJson {
                        i,
                        i64,
                        l: if tp.location().is_empty() {
                            None
                        } else {
                            Some(tp.location().to_string())
                        },
                        l64: None,
                        v64: Some(URL_SAFE_NO_PAD.encode(tp.verifier_id())),
                    }
                }
            });
        }
        serialized
    }

    fn into_macaroon(self) -> Result<Macaroon> {
        if self.v != 2 {
            return Err(MacaroonError::malformed(format!(
                "unsupported json version {}",
                self.v
            )));
        }
        let mut builder = MacaroonBuilder::new(Format::V2);
        builder.set_identifier(decode_identifier(self.i, self.i64, "macaroon")?);
        if let Some(location) = decode_location(self.l, self.l64, "macaroon")? {
            builder.set_location(location);
        }
        let signature = base64_decode_any(&self.s64)?;
        let signature = MacaroonKey::from_slice(&signature).ok_or_else(|| {
            MacaroonError::malformed(format!(
                "signature has unexpected length {}",
                signature.len()
            ))
        })?;
        builder.set_signature(signature);

        for caveat_json in self.c {
            let mut caveat = CaveatBuilder::new();
            caveat.add_id(decode_identifier(caveat_json.i, caveat_json.i64, "caveat")?);
            if let Some(location) = decode_location(caveat_json.l, caveat_json.l64, "caveat")? {
                caveat.add_location(location);
            }
            if let Some(v64) = caveat_json.v64 {
                caveat.add_verifier_id(base64_decode_any(&v64)?.into());
            }
            builder.add_caveat(caveat.build()?);
        }
        builder.build()
    }
}

fn identifier_fields(identifier: &ByteString) -> (Option<String>, Option<String>) {
    match std::str::from_utf8(identifier.as_ref()) {
        Ok(text) => (Some(text.to_string()), None),
        Err(_) => (None, Some(URL_SAFE_NO_PAD.encode(identifier))),
    }
}

fn decode_location(
    text: Option<String>,
    encoded: Option<String>,
    what: &str,
) -> Result<Option<String>> {
    match (text, encoded) {
        (Some(_), Some(_)) => Err(MacaroonError::malformed(format!(
            "{} has both l and l64 fields",
            what
        ))),
        (Some(text), None) => Ok(Some(text)),
        (None, Some(encoded)) => {
            let decoded = base64_decode_any(&encoded)?;
            Ok(Some(String::from_utf8(decoded).map_err(|_| {
                MacaroonError::malformed(format!("{} location is not valid utf-8", what))
            })?))
        }
        (None, None) => Ok(None),
    }
}

fn decode_identifier(
    text: Option<String>,
    encoded: Option<String>,
    what: &str,
) -> Result<ByteString> {
    match (text, encoded) {
        (Some(_), Some(_)) => Err(MacaroonError::malformed(format!(
            "{} has both i and i64 fields",
            what
        ))),
        (Some(text), None) => Ok(text.into()),
        (None, Some(encoded)) => Ok(base64_decode_any(&encoded)?.into()),
        (None, None) => Err(MacaroonError::malformed(format!(
            "{} has no identifier",
            what
        ))),
    }
}

pub fn serialize(macaroon: &Macaroon) -> Result<String> {
    Ok(serde_json::to_string(&Serialization::from_macaroon(
        macaroon,
    ))?)
}

pub fn deserialize(data: &[u8]) -> Result<Macaroon> {
    let serialization: Serialization = serde_json::from_slice(data)?;
    serialization.into_macaroon()
}

pub(crate) fn from_value(value: serde_json::Value) -> Result<Macaroon> {
    let serialization: Serialization = serde_json::from_value(value)?;
    serialization.into_macaroon()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERIALIZED: &str = "{\"v\":2,\"l\":\"http://example.org/\",\"i\":\"keyid\",\
                              \"c\":[{\"i\":\"account = 3735928559\"},{\"i\":\"user = alice\"}],\
                              \"s64\":\"S-lnzR6gxrJrr2pKlO6bBbFYhtoLqF6MQqk8jQ4SXvw\"}";
    const SIGNATURE: [u8; 32] = [
        75, 233, 103, 205, 30, 160, 198, 178, 107, 175, 106, 74, 148, 238, 155, 5, 177, 88, 134,
        218, 11, 168, 94, 140, 66, 169, 60, 141, 14, 18, 94, 252,
    ];

    #[test]
    fn deserialize_known_token() {
        let macaroon = deserialize(SERIALIZED.as_bytes()).unwrap();
        assert_eq!(macaroon.location(), Some("http://example.org/".into()));
        assert_eq!(macaroon.identifier(), "keyid".into());
        assert_eq!(macaroon.caveats().len(), 2);
        assert_eq!(macaroon.caveats()[0].id(), &"account = 3735928559".into());
        assert_eq!(macaroon.caveats()[1].id(), &"user = alice".into());
        assert_eq!(macaroon.signature(), SIGNATURE.into());
        assert_eq!(macaroon.format(), Format::V2);
    }

    #[test]
    fn round_trip_third_party() {
        let mut macaroon = Macaroon::create(
            Some("http://example.org/".into()),
            b"this is the key",
            "keyid".into(),
        )
        .unwrap();
        macaroon.add_first_party_caveat("user = alice".into()).unwrap();
        macaroon
            .add_third_party_caveat("https://auth.mybank.com/", b"my key", "other keyid".into())
            .unwrap();

        let encoded = serialize(&macaroon).unwrap();
        let decoded = deserialize(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, macaroon);
    }

    #[test]
    fn binary_identifier_uses_i64() {
        let mut macaroon =
            Macaroon::create(None, b"key", ByteString(vec![0xde, 0xad, 0xbe, 0xef])).unwrap();
        macaroon
            .add_first_party_caveat(ByteString(vec![0xff, 0x00]))
            .unwrap();

        let encoded = serialize(&macaroon).unwrap();
        assert!(encoded.contains("\"i64\":"));
        let decoded = deserialize(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, macaroon);
    }

    #[test]
    fn rejects_identifier_twins() {
        let data = "{\"v\":2,\"i\":\"keyid\",\"i64\":\"a2V5aWQ\",\
                    \"s64\":\"S-lnzR6gxrJrr2pKlO6bBbFYhtoLqF6MQqk8jQ4SXvw\"}";
        assert!(deserialize(data.as_bytes()).is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let data = "{\"v\":3,\"i\":\"keyid\",\
                    \"s64\":\"S-lnzR6gxrJrr2pKlO6bBbFYhtoLqF6MQqk8jQ4SXvw\"}";
        assert!(deserialize(data.as_bytes()).is_err());
    }
}
