//! Key pair generation.

use ed25519_dalek::SigningKey;
use lattice_types::{KeyPair, PrivateKey, PublicKey};
use rand::rngs::OsRng;

/// Generate a fresh random key pair.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    keypair_from_signing_key(signing_key)
}

/// Derive a deterministic key pair from a 32-byte seed. Test helper and
/// node-id derivation.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    keypair_from_signing_key(SigningKey::from_bytes(seed))
}

fn keypair_from_signing_key(signing_key: SigningKey) -> KeyPair {
    let public = PublicKey(signing_key.verifying_key().to_bytes());
    let private = PrivateKey(signing_key.to_bytes());
    KeyPair { public, private }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let a = keypair_from_seed(&[7u8; 32]);
        let b = keypair_from_seed(&[7u8; 32]);
        assert_eq!(a.public, b.public);
    }

    #[test]
    fn generated_keys_differ() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.public, b.public);
    }
}
