//! Signature verification. Checking that a signature is valid for an identity
//! is a separate concern from deciding whether that identity satisfies a
//! principal, and callers are free to plug in their own verifier.

use crate::msp::Identity;
use std::convert::TryFrom;
use tracing::trace;

/// Answers "did this identity sign this message?"
pub trait SignatureVerifier {
    fn verify(&self, identity: &Identity, signature: &[u8], message: &[u8]) -> bool;
}

impl<F> SignatureVerifier for F
    where F: Fn(&Identity, &[u8], &[u8]) -> bool,
{
    fn verify(&self, identity: &Identity, signature: &[u8], message: &[u8]) -> bool {
        self(identity, signature, message)
    }
}

/// Verifies signatures made by the Ed25519 key in an identity's certificate.
/// Identities with any other key type never verify.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, identity: &Identity, signature: &[u8], message: &[u8]) -> bool {
        match identity.certificate().ed25519_public_key() {
            Some(pubkey) => verify_ed25519(pubkey, signature, message),
            None => {
                trace!(msp = %identity.msp_id(), "identity does not carry an ed25519 key");
                false
            }
        }
    }
}

/// Verify a detached Ed25519 signature. Anything the wrong length is simply
/// invalid.
pub(crate) fn verify_ed25519(pubkey: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let key_bytes: [u8; 32] = match <[u8; 32]>::try_from(pubkey) {
        Ok(x) => x,
        Err(_) => return false,
    };
    let sig_bytes: [u8; 64] = match <[u8; 64]>::try_from(signature) {
        Ok(x) => x,
        Err(_) => return false,
    };
    let key = match ed25519_consensus::VerificationKey::try_from(key_bytes) {
        Ok(x) => x,
        Err(_) => return false,
    };
    key.verify(&ed25519_consensus::Signature::from(sig_bytes), message).is_ok()
}
