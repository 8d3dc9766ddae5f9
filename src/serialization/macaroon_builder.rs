use crate::caveat::Caveat;
use crate::crypto::key::MacaroonKey;
use crate::serialization::Format;
use crate::{ByteString, Macaroon, MacaroonError, Result};

/// Accumulates macaroon fields while decoding. `build` fails rather than
/// hand back a macaroon that is missing its identifier or signature.
pub(crate) struct MacaroonBuilder {
    identifier: Option<ByteString>,
    location: Option<String>,
    signature: Option<MacaroonKey>,
    caveats: Vec<Caveat>,
    format: Format,
}

impl MacaroonBuilder {
    pub fn new(format: Format) -> MacaroonBuilder {
        MacaroonBuilder {
            identifier: None,
            location: None,
            signature: None,
            caveats: Vec::new(),
            format,
        }
    }

    pub fn set_identifier(&mut self, identifier: ByteString) {
        self.identifier = Some(identifier);
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        let location = location.into();
        if !location.is_empty() {
            self.location = Some(location);
        }
    }

    pub fn set_signature(&mut self, signature: MacaroonKey) {
        self.signature = Some(signature);
    }

    pub fn add_caveat(&mut self, caveat: Caveat) {
        self.caveats.push(caveat);
    }

    pub fn build(self) -> Result<Macaroon> {
        let identifier = self
            .identifier
            .ok_or_else(|| MacaroonError::malformed("no identifier found"))?;
        let signature = self
            .signature
            .ok_or_else(|| MacaroonError::malformed("no signature found"))?;
        Ok(Macaroon::from_parts(
            identifier,
            self.location,
            self.caveats,
            signature,
            self.format,
        ))
    }
}
