//! Block structure for the block-lattice ledger.
//!
//! Blocks are immutable once hashed. Legacy block types (send, receive, open,
//! change) carry their operation in the type tag; state blocks encode it in
//! the balance transition, which the ledger records in the sideband after
//! validation.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::amount::Amount;
use crate::hash::{BlockHash, HashOrAccount};
use crate::keys::Signature;

type Blake2b256 = Blake2b<U32>;

/// Block type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    Send,
    Receive,
    Open,
    Change,
    State,
}

/// Ledger epoch a block belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Epoch {
    Epoch0,
    Epoch1,
    Epoch2,
}

impl Epoch {
    pub const MAX: Self = Epoch::Epoch2;
}

/// Metadata attached to a state block by the ledger after validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSideband {
    /// Whether the state transition is a send.
    pub is_send: bool,
    pub epoch: Epoch,
}

/// The pair (account, root) uniquely identifying a position in an account
/// chain. Two blocks with the same qualified root are forks of each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedRoot {
    pub account: Account,
    pub root: BlockHash,
}

/// A block in the lattice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_type: BlockType,
    /// The account whose chain this block extends.
    pub account: Account,
    /// Hash of the preceding block in the account chain; zero for open blocks.
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    /// Destination account for legacy send blocks; zero otherwise.
    pub destination: Account,
    /// Link field for state blocks: destination on send, source hash on
    /// receive; zero otherwise.
    pub link: BlockHash,
    pub work: u64,
    pub signature: Signature,
    /// Attached by the ledger once the block is applied.
    pub sideband: Option<BlockSideband>,
    pub hash: BlockHash,
}

impl Block {
    /// Blake2b-256 over the identity fields. Work, signature, and sideband
    /// are not part of the hash.
    pub fn compute_hash(&self) -> BlockHash {
        let mut hasher = Blake2b256::new();
        hasher.update([self.block_type_tag()]);
        hasher.update(self.account.as_bytes());
        hasher.update(self.previous.as_bytes());
        hasher.update(self.representative.as_bytes());
        hasher.update(self.balance.number().to_be_bytes());
        hasher.update(self.destination.as_bytes());
        hasher.update(self.link.as_bytes());
        BlockHash::new(hasher.finalize().into())
    }

    fn block_type_tag(&self) -> u8 {
        match self.block_type {
            BlockType::Send => 2,
            BlockType::Receive => 3,
            BlockType::Open => 4,
            BlockType::Change => 5,
            BlockType::State => 6,
        }
    }

    /// The root of this block's position: `previous` for chained blocks, the
    /// account itself for first-in-chain blocks.
    pub fn root(&self) -> BlockHash {
        if self.previous.is_zero() {
            BlockHash::new(*self.account.as_bytes())
        } else {
            self.previous
        }
    }

    pub fn qualified_root(&self) -> QualifiedRoot {
        QualifiedRoot {
            account: self.account,
            root: self.root(),
        }
    }

    /// Whether this block moves funds out of the account. For state blocks
    /// this is only known once the sideband is attached.
    pub fn is_send(&self) -> bool {
        match self.block_type {
            BlockType::Send => true,
            BlockType::State => self.sideband.map(|s| s.is_send).unwrap_or(false),
            _ => false,
        }
    }

    /// The epoch recorded in the sideband; `Epoch0` before attachment.
    pub fn epoch(&self) -> Epoch {
        self.sideband.map(|s| s.epoch).unwrap_or(Epoch::Epoch0)
    }

    /// Key for the second unchecked lookup after a send progresses:
    /// `destination` for legacy sends, `link` for state sends.
    pub fn destination_or_link(&self) -> HashOrAccount {
        if self.destination.is_zero() {
            self.link.into()
        } else {
            self.destination.into()
        }
    }
}
