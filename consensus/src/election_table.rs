//! The bounded table of active elections.
//!
//! One election per qualified root. Total capacity is bounded, with a slice
//! reserved for hint-driven admission so heavy cached votes can always start
//! an election even when priority traffic has filled the table.

use std::collections::HashMap;

use lattice_types::{Account, Amount, Block, BlockHash, QualifiedRoot};
use tracing::trace;

use crate::election::{Election, ElectionBehavior};

/// Active elections keyed by qualified root, with a hash index for vote
/// routing.
pub struct ElectionTable {
    elections: HashMap<QualifiedRoot, Election>,
    by_hash: HashMap<BlockHash, QualifiedRoot>,
    limit: usize,
    hinted_limit: usize,
    hinted_count: usize,
    /// Online-weight quorum for confirmation; zero disables confirmation.
    quorum: Amount,
}

impl ElectionTable {
    /// `hinted_limit_percent` of `limit` slots are reserved for hinted
    /// admission.
    pub fn new(limit: usize, hinted_limit_percent: usize) -> Self {
        Self {
            elections: HashMap::new(),
            by_hash: HashMap::new(),
            limit,
            hinted_limit: (limit * hinted_limit_percent / 100).max(1),
            hinted_count: 0,
            quorum: Amount::ZERO,
        }
    }

    pub fn set_quorum(&mut self, quorum: Amount) {
        self.quorum = quorum;
    }

    /// Free slots in the whole table.
    pub fn vacancy(&self) -> i64 {
        self.limit as i64 - self.elections.len() as i64
    }

    /// Free slots reserved for hint-driven admission.
    pub fn vacancy_hinted(&self) -> i64 {
        self.hinted_limit as i64 - self.hinted_count as i64
    }

    pub fn len(&self) -> usize {
        self.elections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elections.is_empty()
    }

    pub fn exists(&self, hash: &BlockHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn election(&self, hash: &BlockHash) -> Option<&Election> {
        self.elections.get(self.by_hash.get(hash)?)
    }

    pub fn election_mut(&mut self, hash: &BlockHash) -> Option<&mut Election> {
        self.elections.get_mut(self.by_hash.get(hash)?)
    }

    pub fn confirmed(&self, hash: &BlockHash) -> bool {
        self.election(hash).map(|e| e.is_confirmed()).unwrap_or(false)
    }

    /// Insert an election for `block`. If an election for the same root
    /// already exists, the block joins it as a fork candidate and `false`
    /// is returned. Capacity must be checked by the caller (the admission
    /// rule lives with the schedulers).
    pub fn insert(&mut self, block: &Block, behavior: ElectionBehavior) -> bool {
        let root = block.qualified_root();
        if let Some(election) = self.elections.get_mut(&root) {
            election.add_candidate(block);
            self.by_hash.insert(block.hash, root);
            return false;
        }
        trace!(hash = %block.hash, ?behavior, "election started");
        self.elections.insert(root, Election::new(block, behavior));
        self.by_hash.insert(block.hash, root);
        if behavior == ElectionBehavior::Hinted {
            self.hinted_count += 1;
        }
        true
    }

    /// Erase the election at `root`. Returns `true` if one existed.
    pub fn erase(&mut self, root: &QualifiedRoot) -> bool {
        match self.elections.remove(root) {
            Some(election) => {
                if election.behavior() == ElectionBehavior::Hinted {
                    self.hinted_count -= 1;
                }
                self.by_hash.retain(|_, r| r != root);
                true
            }
            None => false,
        }
    }

    /// Route one representative vote to the election containing `hash`.
    /// Returns `Some(confirmed)` when an election was found.
    pub fn vote(
        &mut self,
        rep: Account,
        hash: &BlockHash,
        weight: Amount,
        timestamp: u64,
        is_final: bool,
    ) -> Option<bool> {
        let quorum = self.quorum;
        let election = self.election_mut(hash)?;
        election.vote(rep, weight, *hash, timestamp, is_final);
        Some(election.try_confirm(quorum))
    }
}
