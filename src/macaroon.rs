use rand::RngCore;

use crate::caveat::{self, Caveat};
use crate::crypto::{self, key::MacaroonKey};
use crate::serialization::{self, packet, Format};
use crate::{ByteString, Result};

/// A macaroon: a credential bound to a secret root key, carrying an ordered
/// list of caveats and a chained HMAC signature over all of them.
///
/// Macaroons are mutable values; use [`Macaroon::clone`] before attenuating
/// when the original must stay usable. Every mutating operation re-derives
/// the signature from the previous one, except [`Macaroon::bind`], which
/// ties a discharge macaroon to the credential it discharges.
#[derive(Clone, Debug)]
pub struct Macaroon {
    pub(crate) identifier: ByteString,
    pub(crate) location: Option<String>,
    pub(crate) caveats: Vec<Caveat>,
    pub(crate) signature: MacaroonKey,
    pub(crate) format: Format,
}

impl Macaroon {
    /// Mint a new macaroon from a secret root key.
    ///
    /// The key may be of any length; it is normalized to 32 bytes before
    /// use (see [`MacaroonKey::normalize`]). The location is an untrusted
    /// hint and is not covered by the signature.
    pub fn create(
        location: Option<String>,
        root_key: impl AsRef<[u8]>,
        identifier: ByteString,
    ) -> Result<Macaroon> {
        if let Some(ref location) = location {
            packet::guard_payload(packet::LOCATION, location.len())?;
        }
        packet::guard_payload(packet::IDENTIFIER, identifier.len())?;

        let key = MacaroonKey::normalize(root_key);
        let signature = crypto::keyed_hash(&key, identifier.as_ref());
        Ok(Macaroon {
            identifier,
            location: location.filter(|location| !location.is_empty()),
            caveats: Vec::new(),
            signature,
            format: Format::V2,
        })
    }

    pub(crate) fn from_parts(
        identifier: ByteString,
        location: Option<String>,
        caveats: Vec<Caveat>,
        signature: MacaroonKey,
        format: Format,
    ) -> Macaroon {
        Macaroon {
            identifier,
            location: location.filter(|location| !location.is_empty()),
            caveats,
            signature,
            format,
        }
    }

    /// The macaroon's location hint. Not authenticated.
    pub fn location(&self) -> Option<String> {
        self.location.clone()
    }

    /// The macaroon's identifier. May hold arbitrary bytes.
    pub fn identifier(&self) -> ByteString {
        self.identifier.clone()
    }

    /// The macaroon's current signature.
    pub fn signature(&self) -> MacaroonKey {
        self.signature
    }

    /// The caveats in the order they were added.
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    /// The wire format this macaroon was decoded from, or will encode to by
    /// default. Freshly minted macaroons use [`Format::V2`].
    pub fn format(&self) -> Format {
        self.format
    }

    /// Append a caveat that the target service verifies itself, folding the
    /// predicate into the signature chain.
    pub fn add_first_party_caveat(&mut self, predicate: ByteString) -> Result<()> {
        packet::guard_payload(packet::CID, predicate.len())?;
        self.signature = crypto::keyed_hash(&self.signature, predicate.as_ref());
        self.caveats.push(caveat::new_first_party(predicate));
        Ok(())
    }

    /// Append a caveat that must be discharged by the third party at
    /// `location`, using the root key shared with that third party.
    ///
    /// The caveat id should encode the key and condition in a way the third
    /// party can recover, either by encryption under a key it knows or as a
    /// reference into its storage. The verification id seals the (normalized)
    /// root key under this macaroon's current signature, with a random nonce
    /// so that repeated caveats against the same third party do not
    /// correlate.
    pub fn add_third_party_caveat(
        &mut self,
        location: &str,
        root_key: impl AsRef<[u8]>,
        id: ByteString,
    ) -> Result<()> {
        self.add_third_party_caveat_with_rng(location, root_key, id, &mut rand::thread_rng())
    }

    /// Like [`Macaroon::add_third_party_caveat`], drawing the nonce from the
    /// given randomness source instead of the thread rng.
    pub fn add_third_party_caveat_with_rng(
        &mut self,
        location: &str,
        root_key: impl AsRef<[u8]>,
        id: ByteString,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        packet::guard_payload(packet::CID, id.len())?;
        packet::guard_payload(packet::CL, location.len())?;

        let caveat_key = MacaroonKey::normalize(root_key);
        let verifier_id = crypto::encrypt(&self.signature, &caveat_key, rng)?;
        packet::guard_payload(packet::VID, verifier_id.len())?;

        self.signature = crypto::keyed_hash2(&self.signature, &verifier_id, id.as_ref());
        self.caveats
            .push(caveat::new_third_party(id, verifier_id.into(), location));
        Ok(())
    }

    /// Prepare this macaroon for use as a discharge of the macaroon whose
    /// signature is `root_sig`. A no-op when the signatures already match;
    /// otherwise the signature becomes `SHA-256(root_sig || sig)`, so the
    /// discharge cannot be replayed against any other credential.
    pub fn bind(&mut self, root_sig: &MacaroonKey) {
        self.signature = crypto::bind_for_request(root_sig, &self.signature);
    }

    /// Verify the signature chain, every caveat condition, and the discharge
    /// graph rooted at this macaroon.
    ///
    /// `check` is called for each first-party caveat, in order, across this
    /// macaroon and every discharge reached through a third-party caveat; it
    /// returns a description of the failure when a condition is not met,
    /// which is surfaced in
    /// [`FirstPartyCheckFailed`](crate::MacaroonError::FirstPartyCheckFailed).
    /// Each supplied discharge must be consumed exactly once. Verification
    /// does no I/O and completes synchronously.
    pub fn verify<F>(
        &self,
        root_key: impl AsRef<[u8]>,
        check: F,
        discharges: &[Macaroon],
    ) -> Result<()>
    where
        F: FnMut(&ByteString) -> std::result::Result<(), String>,
    {
        crate::verifier::verify_with_key(self, &MacaroonKey::normalize(root_key), check, discharges)
    }

    /// Encode into the requested binary wire format.
    pub fn serialize(&self, format: Format) -> Result<Vec<u8>> {
        match format {
            Format::V1 => serialization::v1::serialize(self),
            Format::V2 => serialization::v2::serialize(self),
        }
    }

    /// Encode into the canonical JSON form.
    pub fn serialize_json(&self) -> Result<String> {
        serialization::json::serialize(self)
    }

    /// Decode a macaroon from any supported encoding, dispatching on the
    /// leading byte: `{` selects JSON (either JSON shape), `0x02` the V2
    /// binary format, and anything else the V1 binary format.
    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Macaroon> {
        let data = data.as_ref();
        match data.first() {
            Some(&b'{') => serialization::deserialize_json_any(data),
            _ => Macaroon::deserialize_binary(data),
        }
    }

    /// Decode a single binary macaroon, auto-detecting V1 vs V2 from the
    /// first byte. Input must contain exactly one macaroon; anything after
    /// it fails with [`TrailingGarbage`](crate::MacaroonError::TrailingGarbage).
    pub fn deserialize_binary(data: &[u8]) -> Result<Macaroon> {
        let (macaroon, rest) = serialization::deserialize_prefix(data)?;
        if !rest.is_empty() {
            return Err(crate::MacaroonError::TrailingGarbage);
        }
        Ok(macaroon)
    }
}

/// Equality over the observable fields; the serialization format attribute
/// is not part of a macaroon's identity.
impl PartialEq for Macaroon {
    fn eq(&self, other: &Macaroon) -> bool {
        self.identifier == other.identifier
            && self.location == other.location
            && self.caveats == other.caveats
            && self.signature == other.signature
    }
}

impl Eq for Macaroon {}
