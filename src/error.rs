use thiserror::Error;

use crate::ByteString;

/// Why decrypting a third-party caveat's verification id failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoFailure {
    /// The ciphertext is shorter than a nonce plus an authentication tag.
    #[error("message too short")]
    TooShort,
    /// The authentication tag did not check out, or the recovered key
    /// material had the wrong length.
    #[error("decryption failure")]
    AuthFailed,
}

/// Represents all of the errors that can arise when creating, attenuating,
/// serializing, deserializing, or verifying macaroons.
///
/// The variants form a flat taxonomy. Construction-time errors
/// (`FieldTooLong`, `RandomnessFailure`) reject the input before the
/// macaroon is mutated. Decode errors (`MalformedPacket`, `TrailingGarbage`,
/// `Base64Decode`, `HexDecode`, `Json`) never yield a partially populated
/// macaroon. Verification errors distinguish a rejected caveat condition
/// (`FirstPartyCheckFailed`, whose `cause` is the checker's own error,
/// surfaced unmodified) from problems with the credential bundle itself
/// (`SignatureMismatch`, `CryptoFailure`, and the discharge accounting
/// errors). Nothing is retried internally; the first failure wins.
#[derive(Debug, Error)]
pub enum MacaroonError {
    #[error("field {which} is too big for macaroon")]
    FieldTooLong { which: &'static str },

    #[error("malformed packet: {detail}")]
    MalformedPacket { detail: String },

    #[error("trailing data after macaroon")]
    TrailingGarbage,

    #[error("macaroon {field} is not valid UTF-8")]
    NotUtf8 { field: &'static str },

    #[error("cannot decode base64 field: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("cannot decode hex field: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("cannot decrypt verification id: {0}")]
    CryptoFailure(#[from] CryptoFailure),

    #[error("cannot find discharge macaroon for caveat {cid:?}")]
    MissingDischarge { cid: ByteString },

    #[error("discharge macaroon {id:?} was used more than once")]
    DischargeReused { id: ByteString },

    #[error("discharge macaroon {id:?} was not used")]
    UnusedDischarge { id: ByteString },

    #[error("signature mismatch after caveat verification")]
    SignatureMismatch,

    #[error("condition {condition:?} not met: {cause}")]
    FirstPartyCheckFailed { condition: ByteString, cause: String },

    #[error("cannot generate random bytes: {0}")]
    RandomnessFailure(String),

    #[error("cannot parse json data: {0}")]
    Json(#[from] serde_json::Error),
}

impl MacaroonError {
    pub(crate) fn malformed(detail: impl Into<String>) -> MacaroonError {
        MacaroonError::MalformedPacket {
            detail: detail.into(),
        }
    }
}
