//! Block table: blocks by hash plus the successor index by qualified root.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use lattice_types::{Block, BlockHash, QualifiedRoot};

use crate::transaction::{Table, Transaction, WriteTransaction};

#[derive(Default)]
struct Inner {
    blocks: HashMap<BlockHash, Block>,
    /// Qualified root -> hash of the block currently occupying that chain
    /// position.
    successors: HashMap<QualifiedRoot, BlockHash>,
    /// Hashes of confirmed blocks.
    confirmed: HashSet<BlockHash>,
}

/// Blocks keyed by hash, with the successor index the fork path depends on.
pub struct BlockTable {
    inner: RwLock<Inner>,
}

impl BlockTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn get(&self, _txn: &dyn Transaction, hash: &BlockHash) -> Option<Block> {
        self.inner.read().unwrap().blocks.get(hash).cloned()
    }

    pub fn exists(&self, _txn: &dyn Transaction, hash: &BlockHash) -> bool {
        self.inner.read().unwrap().blocks.contains_key(hash)
    }

    pub fn put(&self, txn: &WriteTransaction, block: &Block) {
        debug_assert!(txn.covers(Table::Blocks));
        let mut inner = self.inner.write().unwrap();
        inner.successors.insert(block.qualified_root(), block.hash);
        inner.blocks.insert(block.hash, block.clone());
    }

    pub fn del(&self, txn: &WriteTransaction, hash: &BlockHash) {
        debug_assert!(txn.covers(Table::Blocks));
        let mut inner = self.inner.write().unwrap();
        if let Some(block) = inner.blocks.remove(hash) {
            let root = block.qualified_root();
            if inner.successors.get(&root) == Some(hash) {
                inner.successors.remove(&root);
            }
            inner.confirmed.remove(hash);
        }
    }

    /// Hash of the block occupying the chain position identified by `root`.
    pub fn successor(&self, _txn: &dyn Transaction, root: &QualifiedRoot) -> Option<BlockHash> {
        self.inner.read().unwrap().successors.get(root).copied()
    }

    pub fn set_confirmed(&self, txn: &WriteTransaction, hash: &BlockHash) {
        debug_assert!(txn.covers(Table::Blocks));
        self.inner.write().unwrap().confirmed.insert(*hash);
    }

    pub fn is_confirmed(&self, _txn: &dyn Transaction, hash: &BlockHash) -> bool {
        self.inner.read().unwrap().confirmed.contains(hash)
    }

    pub fn count(&self, _txn: &dyn Transaction) -> usize {
        self.inner.read().unwrap().blocks.len()
    }
}
