//! Representative votes.

use serde::{Deserialize, Serialize};

use lattice_crypto::{sign_message, verify_signature};
use lattice_types::{Account, BlockHash, PrivateKey, PublicKey, Signature};

/// A vote by one representative over a set of block hashes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// The voting representative (its public key bytes).
    pub voter: Account,
    /// Vote timestamp in seconds; higher timestamps replace lower ones.
    pub timestamp: u64,
    /// Whether this is a final vote.
    pub is_final: bool,
    pub hashes: Vec<BlockHash>,
    pub signature: Signature,
}

impl Vote {
    /// The signed message: timestamp (big-endian) followed by each hash.
    pub fn signed_message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(8 + self.hashes.len() * 32);
        message.extend_from_slice(&self.timestamp.to_be_bytes());
        for hash in &self.hashes {
            message.extend_from_slice(hash.as_bytes());
        }
        message
    }

    /// Build and sign a vote.
    pub fn signed(
        private_key: &PrivateKey,
        public_key: &PublicKey,
        timestamp: u64,
        is_final: bool,
        hashes: Vec<BlockHash>,
    ) -> Self {
        let mut vote = Self {
            voter: Account::new(public_key.0),
            timestamp,
            is_final,
            hashes,
            signature: Signature::ZERO,
        };
        vote.signature = sign_message(&vote.signed_message(), private_key);
        vote
    }

    pub fn verify(&self) -> bool {
        let public_key = PublicKey(*self.voter.as_bytes());
        verify_signature(&self.signed_message(), &self.signature, &public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_crypto::keypair_from_seed;

    #[test]
    fn signed_vote_verifies() {
        let kp = keypair_from_seed(&[5u8; 32]);
        let vote = Vote::signed(
            &kp.private,
            &kp.public,
            100,
            false,
            vec![BlockHash::new([1u8; 32])],
        );
        assert!(vote.verify());
    }

    #[test]
    fn tampered_vote_fails() {
        let kp = keypair_from_seed(&[5u8; 32]);
        let mut vote = Vote::signed(
            &kp.private,
            &kp.public,
            100,
            false,
            vec![BlockHash::new([1u8; 32])],
        );
        vote.timestamp = 101;
        assert!(!vote.verify());
    }

    #[test]
    fn message_covers_all_hashes() {
        let kp = keypair_from_seed(&[5u8; 32]);
        let vote = Vote::signed(
            &kp.private,
            &kp.public,
            100,
            true,
            vec![BlockHash::new([1u8; 32]), BlockHash::new([2u8; 32])],
        );
        assert_eq!(vote.signed_message().len(), 8 + 64);
        assert!(vote.verify());
    }
}
