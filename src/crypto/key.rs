use std::fmt;
use std::ops::Deref;

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const KEY_BYTES: usize = 32;

/// A 32-byte secret used to sign and verify macaroons.
///
/// The same fixed-size value serves as a root key, a derived caveat key, and
/// a macaroon signature, because the signature chain feeds each HMAC output
/// back in as the next key. Comparison is constant-time, so signatures can be
/// checked with `==` without leaking where the first differing byte is.
///
/// Arbitrary-length secrets are brought to this size with
/// [`MacaroonKey::normalize`]: input shorter than 32 bytes is zero-padded,
/// anything else is replaced by its SHA-256 digest. This matches what other
/// macaroon implementations do, and is what makes independently minted
/// macaroons and discharges interoperate.
///
/// ```rust
/// use macaroons::MacaroonKey;
///
/// // bring a passphrase of any length to key size
/// let key = MacaroonKey::normalize(b"why is a raven like a writing desk?");
///
/// // or use 32 bytes of existing entropy verbatim
/// let raw: MacaroonKey = [7u8; 32].into();
///
/// // or draw a fresh random key
/// let fresh = MacaroonKey::generate_random();
/// # let _ = (key, raw, fresh);
/// ```
#[derive(Clone, Copy, Eq)]
pub struct MacaroonKey(pub [u8; KEY_BYTES]);

impl MacaroonKey {
    /// Bring a secret of arbitrary length to key size.
    ///
    /// Input shorter than 32 bytes is zero-padded; input of 32 bytes or more
    /// is replaced by its SHA-256 digest.
    pub fn normalize(raw: impl AsRef<[u8]>) -> MacaroonKey {
        let raw = raw.as_ref();
        if raw.len() < KEY_BYTES {
            let mut key = [0; KEY_BYTES];
            key[..raw.len()].copy_from_slice(raw);
            MacaroonKey(key)
        } else {
            MacaroonKey(Sha256::digest(raw).into())
        }
    }

    /// Generate a new key from the system's secure random number generator.
    pub fn generate_random() -> MacaroonKey {
        let mut key = [0; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut key);
        MacaroonKey(key)
    }

    /// The raw key bytes. Handy where an `AsRef<[u8]>`-generic callee would
    /// otherwise make `as_ref` ambiguous.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Option<MacaroonKey> {
        if bytes.len() != KEY_BYTES {
            return None;
        }
        let mut key = [0; KEY_BYTES];
        key.copy_from_slice(bytes);
        Some(MacaroonKey(key))
    }
}

impl PartialEq for MacaroonKey {
    fn eq(&self, other: &MacaroonKey) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl AsRef<[u8; KEY_BYTES]> for MacaroonKey {
    fn as_ref(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }
}

impl AsRef<[u8]> for MacaroonKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for MacaroonKey {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_BYTES]> for MacaroonKey {
    /// Uses the bytes verbatim, with no normalization.
    fn from(b: [u8; KEY_BYTES]) -> Self {
        MacaroonKey(b)
    }
}

impl From<&[u8; KEY_BYTES]> for MacaroonKey {
    /// Uses the bytes verbatim, with no normalization.
    fn from(b: &[u8; KEY_BYTES]) -> Self {
        MacaroonKey(*b)
    }
}

impl fmt::Debug for MacaroonKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacaroonKey({})", hex::encode(self.0))
    }
}
