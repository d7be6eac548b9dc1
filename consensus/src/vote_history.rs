//! Local vote history, keyed by election root.
//!
//! Remembers the votes this node has broadcast per chain position so they
//! can be re-sent, and so rollbacks can retract the history for positions
//! whose winner changed.

use std::collections::HashMap;

use lattice_types::{Account, BlockHash};

/// Votes this node has published, per root.
pub struct LocalVoteHistory {
    votes: HashMap<BlockHash, Vec<(Account, BlockHash)>>,
}

impl LocalVoteHistory {
    pub fn new() -> Self {
        Self {
            votes: HashMap::new(),
        }
    }

    pub fn add(&mut self, root: BlockHash, rep: Account, winner: BlockHash) {
        let entries = self.votes.entry(root).or_default();
        entries.retain(|(existing, _)| *existing != rep);
        entries.push((rep, winner));
    }

    pub fn votes(&self, root: &BlockHash) -> Vec<(Account, BlockHash)> {
        self.votes.get(root).cloned().unwrap_or_default()
    }

    /// Forget everything recorded for `root`.
    pub fn erase(&mut self, root: &BlockHash) {
        self.votes.remove(root);
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

impl Default for LocalVoteHistory {
    fn default() -> Self {
        Self::new()
    }
}
