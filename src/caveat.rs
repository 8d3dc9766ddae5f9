use crate::{ByteString, MacaroonError, Result};

/// A restriction embedded in a macaroon.
///
/// A first-party caveat carries a predicate the target service checks
/// itself. A third-party caveat carries an identifier for an external
/// service, a verification id (the caveat's root key sealed under the
/// signature the macaroon had when the caveat was added), and a location
/// hint for that service. A caveat is third-party exactly when its
/// verification id is non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caveat {
    FirstParty(FirstParty),
    ThirdParty(ThirdParty),
}

impl Caveat {
    /// The caveat identifier: the predicate of a first-party caveat, or the
    /// opaque id a third party resolves back into a key and condition.
    pub fn id(&self) -> &ByteString {
        match self {
            Caveat::FirstParty(fp) => &fp.predicate,
            Caveat::ThirdParty(tp) => &tp.id,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Caveat::FirstParty(_) => None,
            Caveat::ThirdParty(tp) => Some(&tp.location),
        }
    }

    pub fn is_third_party(&self) -> bool {
        matches!(self, Caveat::ThirdParty(_))
    }

    /// The verification id bytes as folded into the signature chain; empty
    /// for first-party caveats.
    pub(crate) fn verifier_id_bytes(&self) -> &[u8] {
        match self {
            Caveat::FirstParty(_) => &[],
            Caveat::ThirdParty(tp) => tp.verifier_id.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirstParty {
    predicate: ByteString,
}

impl FirstParty {
    pub fn predicate(&self) -> &ByteString {
        &self.predicate
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThirdParty {
    id: ByteString,
    verifier_id: ByteString,
    location: String,
}

impl ThirdParty {
    pub fn id(&self) -> &ByteString {
        &self.id
    }

    pub fn verifier_id(&self) -> &ByteString {
        &self.verifier_id
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

pub(crate) fn new_first_party(predicate: ByteString) -> Caveat {
    Caveat::FirstParty(FirstParty { predicate })
}

pub(crate) fn new_third_party(
    id: ByteString,
    verifier_id: ByteString,
    location: impl Into<String>,
) -> Caveat {
    Caveat::ThirdParty(ThirdParty {
        id,
        verifier_id,
        location: location.into(),
    })
}

/// Accumulates caveat fields while decoding, then decides which kind of
/// caveat they form.
#[derive(Default)]
pub struct CaveatBuilder {
    id: Option<ByteString>,
    verifier_id: Option<ByteString>,
    location: Option<String>,
}

impl CaveatBuilder {
    pub fn new() -> CaveatBuilder {
        Default::default()
    }

    pub fn add_id(&mut self, id: ByteString) {
        self.id = Some(id);
    }

    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn add_verifier_id(&mut self, vid: ByteString) {
        self.verifier_id = Some(vid);
    }

    pub fn has_verifier_id(&self) -> bool {
        self.verifier_id.is_some()
    }

    pub fn add_location(&mut self, location: impl Into<String>) {
        let location = location.into();
        if !location.is_empty() {
            self.location = Some(location);
        }
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    pub fn build(self) -> Result<Caveat> {
        let id = self
            .id
            .ok_or_else(|| MacaroonError::malformed("caveat has no identifier"))?;
        match self.verifier_id {
            Some(vid) if !vid.is_empty() => {
                Ok(new_third_party(id, vid, self.location.unwrap_or_default()))
            }
            _ if self.location.is_some() => Err(MacaroonError::malformed(
                "caveat location without verification id",
            )),
            _ => Ok(new_first_party(id)),
        }
    }
}
