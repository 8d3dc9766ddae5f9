//! Implementation of macaroons: bearer credentials in which every holder can
//! embed further restrictions ("caveats") without contacting the issuer, as
//! described in the paper "Macaroons: Cookies with Contextual Caveats for
//! Decentralized Authorization in the Cloud"
//! (<http://theory.stanford.edu/~ataly/Papers/macaroons.pdf>).
//!
//! A macaroon is minted from a secret root key, an identifier and a location
//! hint. First-party caveats carry a condition the target service checks
//! itself; third-party caveats name an external service that must issue a
//! matching discharge macaroon. Each mutation folds the new caveat into a
//! running HMAC-SHA-256 signature, so a macaroon can be attenuated freely but
//! never un-attenuated.
//!
//! ```rust
//! use macaroons::{Macaroon, Verifier};
//!
//! # fn main() -> macaroons::Result<()> {
//! let mut macaroon = Macaroon::create(
//!     Some("http://example.org/".into()),
//!     b"why is a raven like a writing desk?",
//!     "keyid".into(),
//! )?;
//! macaroon.add_first_party_caveat("account = 3735928559".into())?;
//!
//! let mut verifier = Verifier::new();
//! verifier.satisfy_exact("account = 3735928559".into());
//! verifier.verify(&macaroon, b"why is a raven like a writing desk?", &[])?;
//! # Ok(())
//! # }
//! ```
//!
//! Macaroons serialize to two binary wire formats (the libmacaroons-era V1
//! packet format and the tagged V2 format) and to JSON; see
//! [`serialization`].

use std::fmt;

pub mod caveat;
pub mod crypto;
pub mod error;
pub mod macaroon;
pub mod serialization;
pub mod verifier;

pub use caveat::{Caveat, CaveatBuilder};
pub use crypto::key::MacaroonKey;
pub use error::{CryptoFailure, MacaroonError};
pub use macaroon::Macaroon;
pub use serialization::Format;
pub use verifier::Verifier;

/// Result type for all fallible macaroon operations.
pub type Result<T> = std::result::Result<T, MacaroonError>;

/// An opaque byte string, used for macaroon and caveat identifiers.
///
/// Identifiers are arbitrary bytes on the wire; they only need to be valid
/// UTF-8 when a macaroon is encoded into the JSON forms that cannot express
/// raw bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteString(pub Vec<u8>);

impl ByteString {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for ByteString {
    fn from(s: &str) -> Self {
        ByteString(s.as_bytes().to_vec())
    }
}

impl From<String> for ByteString {
    fn from(s: String) -> Self {
        ByteString(s.into_bytes())
    }
}

impl From<&[u8]> for ByteString {
    fn from(b: &[u8]) -> Self {
        ByteString(b.to_vec())
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(b: Vec<u8>) -> Self {
        ByteString(b)
    }
}

impl<const N: usize> From<&[u8; N]> for ByteString {
    fn from(b: &[u8; N]) -> Self {
        ByteString(b.to_vec())
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ByteString;

    #[test]
    fn bytestring_conversions() {
        let from_str: ByteString = "hello".into();
        let from_bytes: ByteString = b"hello".into();
        let from_vec: ByteString = b"hello".to_vec().into();
        assert_eq!(from_str, from_bytes);
        assert_eq!(from_bytes, from_vec);
        assert_eq!(from_str.as_ref(), b"hello");
        assert_eq!(from_str.len(), 5);
    }

    #[test]
    fn bytestring_debug() {
        let text: ByteString = "plain".into();
        assert_eq!(format!("{:?}", text), "\"plain\"");
        let binary: ByteString = ByteString(vec![0xff, 0x00]);
        assert_eq!(format!("{:?}", binary), "0xff00");
    }
}
