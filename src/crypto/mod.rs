use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::crypto::key::MacaroonKey;
use crate::error::CryptoFailure;
use crate::{MacaroonError, Result};

pub mod key;

pub type MacaroonHmac = Hmac<Sha256>;

/// Nonce size of the secretbox construction (XSalsa20-Poly1305).
pub const NONCE_BYTES: usize = 24;
/// Poly1305 authentication tag size.
pub const TAG_BYTES: usize = 16;

pub(crate) fn keyed_hash(key: &MacaroonKey, data: &[u8]) -> MacaroonKey {
    let mut mac =
        <MacaroonHmac as Mac>::new_from_slice(key.as_ref()).expect("could not create Hmac");
    mac.update(data);
    MacaroonKey(mac.finalize().into_bytes().into())
}

/// One keyed hash over the concatenation of two fields, used to fold a
/// caveat's `verification_id || caveat_id` into the signature chain.
pub(crate) fn keyed_hash2(key: &MacaroonKey, first: &[u8], second: &[u8]) -> MacaroonKey {
    let mut mac =
        <MacaroonHmac as Mac>::new_from_slice(key.as_ref()).expect("could not create Hmac");
    mac.update(first);
    mac.update(second);
    MacaroonKey(mac.finalize().into_bytes().into())
}

/// Binds a discharge macaroon's signature to the signature of the macaroon
/// it discharges. A signature equal to the root signature is left unchanged.
pub(crate) fn bind_for_request(root_sig: &MacaroonKey, discharge_sig: &MacaroonKey) -> MacaroonKey {
    if root_sig == discharge_sig {
        return *root_sig;
    }
    let mut hasher = Sha256::new();
    hasher.update(root_sig.as_bytes());
    hasher.update(discharge_sig.as_bytes());
    MacaroonKey(hasher.finalize().into())
}

/// Seals `plaintext` under `key` with a fresh 24-byte nonce drawn from `rng`,
/// returning `nonce || ciphertext`. The nonce randomizes the output so that
/// verification ids minted against the same third-party key cannot be
/// correlated.
pub(crate) fn encrypt(
    key: &MacaroonKey,
    plaintext: &MacaroonKey,
    rng: &mut dyn RngCore,
) -> Result<Vec<u8>> {
    let mut nonce = [0; NONCE_BYTES];
    rng.try_fill_bytes(&mut nonce)
        .map_err(|err| MacaroonError::RandomnessFailure(err.to_string()))?;

    let cipher = XSalsa20Poly1305::new(Key::from_slice(key.as_ref()));
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .expect("secretbox encryption of a key cannot fail");

    let mut out = Vec::with_capacity(NONCE_BYTES + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Undoes [`encrypt`]: splits off the nonce and opens the box, expecting
/// exactly one key's worth of plaintext.
pub(crate) fn decrypt(key: &MacaroonKey, data: &[u8]) -> Result<MacaroonKey> {
    if data.len() < NONCE_BYTES + TAG_BYTES {
        return Err(CryptoFailure::TooShort.into());
    }
    let (nonce, sealed) = data.split_at(NONCE_BYTES);
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key.as_ref()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoFailure::AuthFailed)?;
    MacaroonKey::from_slice(&plaintext).ok_or_else(|| CryptoFailure::AuthFailed.into())
}
