//! Canonical JSON form, interoperable with libmacaroons' JSON output:
//!
//! ```json
//! {"caveats":[{"cid":"...","vid":"<base64>","cl":"..."}],
//!  "location":"...","identifier":"...","signature":"<hex>"}
//! ```
//!
//! The signature is lowercase hex; `vid` is standard padded base64, though
//! any alphabet and padding is accepted on decode; `vid` and `cl` are
//! omitted for first-party caveats. Identifiers must be valid UTF-8 to be
//! representable here at all; macaroons with binary identifiers have to use
//! a binary format instead.

use serde::{Deserialize, Serialize};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::caveat::{Caveat, CaveatBuilder};
use crate::crypto::key::MacaroonKey;
use crate::serialization::macaroon_builder::MacaroonBuilder;
use crate::serialization::{base64_decode_any, Format};
use crate::{Macaroon, MacaroonError, Result};

#[derive(Debug, Default, Deserialize, Serialize)]
struct Serialization {
    #[serde(default)]
    caveats: Vec<CaveatJson>,
    #[serde(default)]
    location: String,
    identifier: String,
    signature: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct CaveatJson {
    cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vid: Option<String>,
    // Older implementations wrote the caveat location under "location";
    // both spellings decode, "cl" is written.
    #[serde(
        rename = "cl",
        alias = "location",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    cl: Option<String>,
}

impl Serialization {
    fn from_macaroon(macaroon: &Macaroon) -> Result<Serialization> {
        let mut serialized = Serialization {
            caveats: Vec::with_capacity(macaroon.caveats().len()),
            location: macaroon.location.clone().unwrap_or_default(),
            identifier: utf8_field(macaroon.identifier.as_ref(), "identifier")?.to_string(),
            signature: hex::encode(macaroon.signature.as_bytes()),
        };
        for caveat in macaroon.caveats() {
            serialized.caveats.push(match caveat {
                Caveat::FirstParty(fp) => CaveatJson {
                    cid: utf8_field(fp.predicate().as_ref(), "cid")?.to_string(),
                    vid: None,
                    cl: None,
                },
                Caveat::ThirdParty(tp) => CaveatJson {
                    cid: utf8_field(tp.id().as_ref(), "cid")?.to_string(),
                    vid: Some(STANDARD.encode(tp.verifier_id())),
                    cl: if tp.location().is_empty() {
                        None
                    } else {
                        Some(tp.location().to_string())
                    },
                },
            });
        }
        Ok(serialized)
    }

    fn into_macaroon(self) -> Result<Macaroon> {
        let mut builder = MacaroonBuilder::new(Format::V1);
        builder.set_identifier(self.identifier.into());
        builder.set_location(self.location);

        let signature = hex::decode(&self.signature)?;
        let signature = MacaroonKey::from_slice(&signature).ok_or_else(|| {
            MacaroonError::malformed(format!(
                "signature has unexpected length {}",
                signature.len()
            ))
        })?;
        builder.set_signature(signature);

        for caveat_json in self.caveats {
            let mut caveat = CaveatBuilder::new();
            caveat.add_id(caveat_json.cid.into());
            if let Some(vid) = caveat_json.vid {
                if !vid.is_empty() {
                    caveat.add_verifier_id(base64_decode_any(&vid)?.into());
                }
            }
            if let Some(cl) = caveat_json.cl {
                caveat.add_location(cl);
            }
            builder.add_caveat(caveat.build()?);
        }
        builder.build()
    }
}

pub fn serialize(macaroon: &Macaroon) -> Result<String> {
    Ok(serde_json::to_string(&Serialization::from_macaroon(
        macaroon,
    )?)?)
}

pub fn deserialize(data: &[u8]) -> Result<Macaroon> {
    let serialization: Serialization = serde_json::from_slice(data)?;
    serialization.into_macaroon()
}

pub(crate) fn from_value(value: serde_json::Value) -> Result<Macaroon> {
    let serialization: Serialization = serde_json::from_value(value)?;
    serialization.into_macaroon()
}

/// Encode a macaroon slice as a JSON array.
pub fn serialize_slice(macaroons: &[Macaroon]) -> Result<String> {
    let serialized = macaroons
        .iter()
        .map(Serialization::from_macaroon)
        .collect::<Result<Vec<_>>>()?;
    Ok(serde_json::to_string(&serialized)?)
}

/// Decode a JSON array of macaroons.
pub fn deserialize_slice(data: &[u8]) -> Result<Vec<Macaroon>> {
    let serialized: Vec<Serialization> = serde_json::from_slice(data)?;
    serialized
        .into_iter()
        .map(Serialization::into_macaroon)
        .collect()
}

fn utf8_field<'a>(payload: &'a [u8], field: &'static str) -> Result<&'a str> {
    std::str::from_utf8(payload).map_err(|_| MacaroonError::NotUtf8 { field })
}
