//! Ed25519 signing and verification.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use lattice_types::{PrivateKey, PublicKey, Signature};

/// Sign a message with a private key.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify a single signature. Returns `false` for malformed keys or
/// non-canonical signatures.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &sig).is_ok()
}

/// One item of a verification batch: `(message, public key, signature)`.
pub type BatchItem<'a> = (&'a [u8], &'a PublicKey, &'a Signature);

/// Verify a batch of signatures, returning per-item validity.
///
/// The whole batch is checked in one multiscalar pass first; only when that
/// fails (at least one bad item) does it fall back to per-item verification.
pub fn verify_batch(items: &[BatchItem<'_>]) -> Vec<bool> {
    if items.is_empty() {
        return Vec::new();
    }

    let mut keys = Vec::with_capacity(items.len());
    for (_, public_key, _) in items {
        match VerifyingKey::from_bytes(&public_key.0) {
            Ok(key) => keys.push(key),
            // A malformed key poisons the fast path; verify item by item.
            Err(_) => return items.iter().map(verify_one).collect(),
        }
    }

    let messages: Vec<&[u8]> = items.iter().map(|(message, _, _)| *message).collect();
    let signatures: Vec<ed25519_dalek::Signature> = items
        .iter()
        .map(|(_, _, signature)| ed25519_dalek::Signature::from_bytes(&signature.0))
        .collect();

    if ed25519_dalek::verify_batch(&messages, &signatures, &keys).is_ok() {
        return vec![true; items.len()];
    }
    items.iter().map(verify_one).collect()
}

fn verify_one((message, public_key, signature): &BatchItem<'_>) -> bool {
    verify_signature(message, signature, public_key)
}

/// The batch verification collaborator consumed by the vote processor.
pub struct SignatureChecker;

impl SignatureChecker {
    pub fn new() -> Self {
        Self
    }

    /// Verify a batch, returning one flag per item.
    pub fn verify(&self, items: &[BatchItem<'_>]) -> Vec<bool> {
        verify_batch(items)
    }
}

impl Default for SignatureChecker {
    fn default() -> Self {
        Self::new()
    }
}
