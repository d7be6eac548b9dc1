//! Proof-of-work validation at the queue boundary.

use lattice_crypto::blake2b_256;
use lattice_types::{Block, BlockHash};

/// The minimum work difficulty blocks must carry to enter the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct WorkThresholds {
    pub threshold: u64,
}

impl WorkThresholds {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// Accept any work value; used by tests and private networks.
    pub fn disabled() -> Self {
        Self { threshold: 0 }
    }

    /// Difficulty of a block's work nonce against its root:
    /// `Blake2b(root || nonce_le)` read as little-endian u64.
    pub fn difficulty(&self, block: &Block) -> u64 {
        work_value(&block.root(), block.work)
    }

    /// Whether the block's work meets the threshold.
    pub fn validate_entry(&self, block: &Block) -> bool {
        self.difficulty(block) >= self.threshold
    }

    /// Brute-force a nonce meeting the threshold. Test helper; real work
    /// generation is a client concern.
    pub fn generate(&self, root: &BlockHash) -> u64 {
        let mut nonce = 0u64;
        while work_value(root, nonce) < self.threshold {
            nonce += 1;
        }
        nonce
    }
}

fn work_value(root: &BlockHash, nonce: u64) -> u64 {
    let mut input = [0u8; 40];
    input[..32].copy_from_slice(root.as_bytes());
    input[32..].copy_from_slice(&nonce.to_le_bytes());
    let digest = blake2b_256(&input);
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_types::{Account, Amount, BlockType, Signature};

    fn block_with_work(work: u64) -> Block {
        let mut block = Block {
            block_type: BlockType::Open,
            account: Account::new([0x11; 32]),
            previous: BlockHash::ZERO,
            representative: Account::new([0x22; 32]),
            balance: Amount::raw(1),
            destination: Account::ZERO,
            link: BlockHash::new([0x33; 32]),
            work,
            signature: Signature([1u8; 64]),
            sideband: None,
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn disabled_accepts_anything() {
        let work = WorkThresholds::disabled();
        assert!(work.validate_entry(&block_with_work(0)));
    }

    #[test]
    fn generated_work_validates() {
        let work = WorkThresholds::new(1 << 10);
        let block = block_with_work(0);
        let nonce = work.generate(&block.root());
        assert!(work.validate_entry(&block_with_work(nonce)));
    }

    #[test]
    fn impossible_threshold_rejects() {
        let work = WorkThresholds::new(u64::MAX);
        assert!(!work.validate_entry(&block_with_work(12345)));
    }
}
