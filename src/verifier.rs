use log::{debug, info};

use crate::caveat::Caveat;
use crate::crypto::{self, key::MacaroonKey};
use crate::macaroon::Macaroon;
use crate::{ByteString, MacaroonError, Result};

/// Type of callback for [`Verifier::satisfy_general`].
pub type VerifierCallback = fn(&ByteString) -> bool;

/// Collects the conditions a service is prepared to accept, and verifies
/// macaroons against them.
///
/// An exact predicate satisfies a first-party caveat by byte equality; a
/// general callback satisfies any caveat it returns `true` for. A caveat
/// that neither satisfies fails verification. For full control over caveat
/// checking use [`Macaroon::verify`] directly with a closure.
#[derive(Default)]
pub struct Verifier {
    predicates: Vec<ByteString>,
    callbacks: Vec<VerifierCallback>,
}

impl Verifier {
    pub fn new() -> Verifier {
        Default::default()
    }

    /// Accept a caveat condition by exact match.
    pub fn satisfy_exact(&mut self, predicate: ByteString) {
        self.predicates.push(predicate);
    }

    /// Accept any caveat condition the callback returns `true` for.
    pub fn satisfy_general(&mut self, callback: VerifierCallback) {
        self.callbacks.push(callback);
    }

    /// Verify `macaroon` against the root key it was minted with, consuming
    /// each discharge macaroon exactly once.
    pub fn verify(
        &self,
        macaroon: &Macaroon,
        root_key: impl AsRef<[u8]>,
        discharges: &[Macaroon],
    ) -> Result<()> {
        macaroon.verify(
            root_key,
            |condition| {
                if self.satisfies(condition) {
                    Ok(())
                } else {
                    Err("no exact predicate or general callback matched".to_string())
                }
            },
            discharges,
        )
    }

    fn satisfies(&self, condition: &ByteString) -> bool {
        self.predicates.iter().any(|predicate| predicate == condition)
            || self.callbacks.iter().any(|callback| callback(condition))
    }
}

/// Walk the macaroon and its discharge graph with an already-normalized root
/// key. Entry point behind [`Macaroon::verify`].
pub(crate) fn verify_with_key<F>(
    macaroon: &Macaroon,
    key: &MacaroonKey,
    mut check: F,
    discharges: &[Macaroon],
) -> Result<()>
where
    F: FnMut(&ByteString) -> std::result::Result<(), String>,
{
    let root_sig = macaroon.signature();
    let mut used = vec![false; discharges.len()];
    verify_chain(macaroon, key, &root_sig, &mut check, discharges, &mut used)?;
    if let Some(unused) = used.iter().position(|used| !used) {
        let id = discharges[unused].identifier();
        info!("verify: discharge macaroon {:?} was not used", id);
        return Err(MacaroonError::UnusedDischarge { id });
    }
    Ok(())
}

/// Recompute one macaroon's signature chain, checking conditions along the
/// way and recursing into the discharge of every third-party caveat.
///
/// `root_sig` is the signature of the top-level macaroon at the moment
/// verification started; it is threaded unchanged through every level,
/// both for the discharge binding and so a discharge cannot stand on its
/// own. The recursion is bounded because each discharge can be consumed
/// only once.
fn verify_chain<F>(
    macaroon: &Macaroon,
    key: &MacaroonKey,
    root_sig: &MacaroonKey,
    check: &mut F,
    discharges: &[Macaroon],
    used: &mut [bool],
) -> Result<()>
where
    F: FnMut(&ByteString) -> std::result::Result<(), String>,
{
    let mut caveat_sig = crypto::keyed_hash(key, macaroon.identifier.as_ref());
    for caveat in macaroon.caveats() {
        match caveat {
            Caveat::FirstParty(fp) => {
                if let Err(cause) = check(fp.predicate()) {
                    debug!("verify: condition {:?} not met: {}", fp.predicate(), cause);
                    return Err(MacaroonError::FirstPartyCheckFailed {
                        condition: fp.predicate().clone(),
                        cause,
                    });
                }
            }
            Caveat::ThirdParty(tp) => {
                let caveat_key = crypto::decrypt(&caveat_sig, tp.verifier_id().as_ref())?;
                let position = discharges
                    .iter()
                    .position(|discharge| &discharge.identifier == tp.id())
                    .ok_or_else(|| {
                        info!("verify: no discharge macaroon matches caveat {:?}", tp.id());
                        MacaroonError::MissingDischarge {
                            cid: tp.id().clone(),
                        }
                    })?;
                if used[position] {
                    info!("verify: discharge macaroon {:?} used more than once", tp.id());
                    return Err(MacaroonError::DischargeReused {
                        id: tp.id().clone(),
                    });
                }
                used[position] = true;
                verify_chain(
                    &discharges[position],
                    &caveat_key,
                    root_sig,
                    check,
                    discharges,
                    used,
                )?;
            }
        }
        caveat_sig = crypto::keyed_hash2(
            &caveat_sig,
            caveat.verifier_id_bytes(),
            caveat.id().as_ref(),
        );
    }

    // Constant-time comparison via MacaroonKey's PartialEq.
    let bound_sig = crypto::bind_for_request(root_sig, &caveat_sig);
    if bound_sig != macaroon.signature {
        info!(
            "verify: signature mismatch on macaroon {:?}",
            macaroon.identifier
        );
        return Err(MacaroonError::SignatureMismatch);
    }
    Ok(())
}
