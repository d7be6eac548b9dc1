//! A single consensus election over one chain position.

use std::collections::HashMap;

use lattice_types::{Account, Amount, Block, BlockHash, QualifiedRoot};

/// Which admission path started an election. The table reserves capacity
/// per behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElectionBehavior {
    Priority,
    Hinted,
    Manual,
    Optimistic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElectionState {
    /// Created but not yet broadcasting/soliciting votes.
    Passive,
    Active,
    Confirmed,
    Expired,
}

struct VoteInfo {
    timestamp: u64,
    hash: BlockHash,
    weight: Amount,
    is_final: bool,
}

/// One election: a position in an account chain and the votes received for
/// the candidate blocks competing for it.
pub struct Election {
    root: QualifiedRoot,
    behavior: ElectionBehavior,
    state: ElectionState,
    /// Candidate blocks by hash; the winner is the highest-tallied.
    candidates: HashMap<BlockHash, Block>,
    last_votes: HashMap<Account, VoteInfo>,
}

impl Election {
    pub fn new(block: &Block, behavior: ElectionBehavior) -> Self {
        let mut candidates = HashMap::new();
        candidates.insert(block.hash, block.clone());
        Self {
            root: block.qualified_root(),
            behavior,
            state: ElectionState::Passive,
            candidates,
            last_votes: HashMap::new(),
        }
    }

    pub fn root(&self) -> &QualifiedRoot {
        &self.root
    }

    pub fn behavior(&self) -> ElectionBehavior {
        self.behavior
    }

    pub fn state(&self) -> ElectionState {
        self.state
    }

    pub fn transition_active(&mut self) {
        if self.state == ElectionState::Passive {
            self.state = ElectionState::Active;
        }
    }

    pub fn cancel(&mut self) {
        if self.state != ElectionState::Confirmed {
            self.state = ElectionState::Expired;
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == ElectionState::Confirmed
    }

    /// Add a competing block (a fork of the original candidate).
    pub fn add_candidate(&mut self, block: &Block) {
        debug_assert_eq!(block.qualified_root(), self.root);
        self.candidates.entry(block.hash).or_insert_with(|| block.clone());
    }

    /// Apply one representative's vote. A repeat vote replaces the previous
    /// one only with a newer timestamp. Returns `true` if the vote was
    /// applied.
    pub fn vote(
        &mut self,
        rep: Account,
        weight: Amount,
        hash: BlockHash,
        timestamp: u64,
        is_final: bool,
    ) -> bool {
        match self.last_votes.get(&rep) {
            Some(existing) if existing.timestamp >= timestamp => false,
            _ => {
                self.last_votes.insert(
                    rep,
                    VoteInfo {
                        timestamp,
                        hash,
                        weight,
                        is_final,
                    },
                );
                true
            }
        }
    }

    /// Tally of votes for one candidate.
    pub fn tally_for(&self, hash: &BlockHash) -> Amount {
        self.last_votes
            .values()
            .filter(|vote| vote.hash == *hash)
            .map(|vote| vote.weight)
            .sum()
    }

    /// Final-vote tally for one candidate.
    pub fn final_tally_for(&self, hash: &BlockHash) -> Amount {
        self.last_votes
            .values()
            .filter(|vote| vote.hash == *hash && vote.is_final)
            .map(|vote| vote.weight)
            .sum()
    }

    /// The current leader and its tally.
    pub fn winner(&self) -> Option<(BlockHash, Amount)> {
        self.candidates
            .keys()
            .map(|hash| (*hash, self.tally_for(hash)))
            .max_by_key(|(_, tally)| *tally)
    }

    /// Confirm if the leading candidate's tally reaches `quorum`.
    pub fn try_confirm(&mut self, quorum: Amount) -> bool {
        if self.state == ElectionState::Confirmed {
            return true;
        }
        if let Some((_, tally)) = self.winner() {
            if !quorum.is_zero() && tally >= quorum {
                self.state = ElectionState::Confirmed;
                return true;
            }
        }
        false
    }
}
