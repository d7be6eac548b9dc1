//! Vote cache — holds votes that arrive before their election exists.
//!
//! Representatives often broadcast votes for a block before this node has
//! seen the fork, or before the election table has room. Cached votes keep
//! their accumulated weight available: the hinted scheduler starts elections
//! for the heaviest entries, and when an election starts the cached votes
//! are drained into it.

use std::collections::HashMap;

use lattice_types::{Account, Amount, BlockHash};

const MAX_CACHE_SIZE: usize = 65_536;
const MAX_VOTERS_PER_HASH: usize = 64;

struct CachedVote {
    voter: Account,
    weight: Amount,
    timestamp: u64,
    is_final: bool,
}

#[derive(Default)]
struct CacheEntry {
    votes: Vec<CachedVote>,
    tally: Amount,
    final_tally: Amount,
}

/// Pre-election vote storage with per-voter deduplication and running
/// tallies, ordered by descending tally for `peek`/`pop`.
pub struct VoteCache {
    entries: HashMap<BlockHash, CacheEntry>,
    max_size: usize,
}

impl VoteCache {
    pub fn new() -> Self {
        Self::with_max_size(MAX_CACHE_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
        }
    }

    /// Record a vote for `hash`. A repeat voter replaces its previous vote
    /// only with a higher timestamp. When the per-hash voter limit is hit,
    /// the lightest voter is evicted if the newcomer outweighs it.
    pub fn insert(
        &mut self,
        hash: BlockHash,
        voter: Account,
        weight: Amount,
        timestamp: u64,
        is_final: bool,
    ) {
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&hash) {
            // Make room by dropping the lightest entry.
            if let Some(lightest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.tally)
                .map(|(h, _)| *h)
            {
                if self.entries[&lightest].tally >= weight {
                    return;
                }
                self.entries.remove(&lightest);
            }
        }

        let entry = self.entries.entry(hash).or_default();

        if let Some(existing) = entry.votes.iter_mut().find(|v| v.voter == voter) {
            if timestamp > existing.timestamp {
                entry.tally = entry.tally - existing.weight;
                if existing.is_final {
                    entry.final_tally = entry.final_tally - existing.weight;
                }
                existing.weight = weight;
                existing.timestamp = timestamp;
                existing.is_final = is_final;
                entry.tally = entry.tally + weight;
                if is_final {
                    entry.final_tally = entry.final_tally + weight;
                }
            }
            return;
        }

        if entry.votes.len() >= MAX_VOTERS_PER_HASH {
            let lightest = entry
                .votes
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.weight)
                .map(|(i, _)| i);
            match lightest {
                Some(index) if weight > entry.votes[index].weight => {
                    let removed = entry.votes.remove(index);
                    entry.tally = entry.tally - removed.weight;
                    if removed.is_final {
                        entry.final_tally = entry.final_tally - removed.weight;
                    }
                }
                _ => return,
            }
        }

        entry.tally = entry.tally + weight;
        if is_final {
            entry.final_tally = entry.final_tally + weight;
        }
        entry.votes.push(CachedVote {
            voter,
            weight,
            timestamp,
            is_final,
        });
    }

    /// Accumulated `(tally, final_tally)` for a hash.
    pub fn tally(&self, hash: &BlockHash) -> (Amount, Amount) {
        self.entries
            .get(hash)
            .map(|entry| (entry.tally, entry.final_tally))
            .unwrap_or((Amount::ZERO, Amount::ZERO))
    }

    /// The heaviest cached hash whose tally reaches `minimum_tally`, if any.
    pub fn peek(&self, minimum_tally: Amount) -> Option<BlockHash> {
        self.entries
            .iter()
            .max_by_key(|(_, entry)| entry.tally)
            .filter(|(_, entry)| entry.tally >= minimum_tally)
            .map(|(hash, _)| *hash)
    }

    /// Remove and return the heaviest cached hash meeting `minimum_tally`.
    pub fn pop(&mut self, minimum_tally: Amount) -> Option<BlockHash> {
        let hash = self.peek(minimum_tally)?;
        self.entries.remove(&hash);
        Some(hash)
    }

    /// Remove and return all cached votes for a hash (election started).
    pub fn drain(&mut self, hash: &BlockHash) -> Vec<(Account, Amount, u64, bool)> {
        self.entries
            .remove(hash)
            .map(|entry| {
                entry
                    .votes
                    .into_iter()
                    .map(|v| (v.voter, v.weight, v.timestamp, v.is_final))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Top `n` hashes by tally, heaviest first.
    pub fn top(&self, n: usize) -> Vec<(BlockHash, Amount)> {
        let mut all: Vec<(BlockHash, Amount)> = self
            .entries
            .iter()
            .map(|(hash, entry)| (*hash, entry.tally))
            .collect();
        all.sort_by_key(|(_, tally)| std::cmp::Reverse(*tally));
        all.truncate(n);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VoteCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn rep(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    fn raw(value: u128) -> Amount {
        Amount::raw(value)
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = VoteCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.peek(Amount::ZERO), None);
    }

    #[test]
    fn tally_accumulates_across_voters() {
        let mut cache = VoteCache::new();
        cache.insert(hash(1), rep(1), raw(100), 1000, false);
        cache.insert(hash(1), rep(2), raw(200), 1001, true);
        assert_eq!(cache.tally(&hash(1)), (raw(300), raw(200)));
    }

    #[test]
    fn repeat_voter_replaced_only_with_newer_timestamp() {
        let mut cache = VoteCache::new();
        cache.insert(hash(1), rep(1), raw(100), 2000, false);
        cache.insert(hash(1), rep(1), raw(500), 1000, true);
        assert_eq!(cache.tally(&hash(1)), (raw(100), raw(0)));

        cache.insert(hash(1), rep(1), raw(500), 3000, true);
        assert_eq!(cache.tally(&hash(1)), (raw(500), raw(500)));
    }

    #[test]
    fn peek_respects_threshold() {
        let mut cache = VoteCache::new();
        cache.insert(hash(1), rep(1), raw(100), 1000, false);
        cache.insert(hash(2), rep(2), raw(400), 1001, false);

        assert_eq!(cache.peek(raw(500)), None);
        assert_eq!(cache.peek(raw(400)), Some(hash(2)));
        assert_eq!(cache.peek(raw(50)), Some(hash(2)));
    }

    #[test]
    fn pop_removes_heaviest() {
        let mut cache = VoteCache::new();
        cache.insert(hash(1), rep(1), raw(100), 1000, false);
        cache.insert(hash(2), rep(2), raw(400), 1001, false);

        assert_eq!(cache.pop(raw(50)), Some(hash(2)));
        assert_eq!(cache.pop(raw(50)), Some(hash(1)));
        assert_eq!(cache.pop(raw(50)), None);
    }

    #[test]
    fn drain_returns_votes_and_clears() {
        let mut cache = VoteCache::new();
        cache.insert(hash(1), rep(1), raw(100), 1000, false);
        cache.insert(hash(1), rep(2), raw(200), 1001, true);

        let votes = cache.drain(&hash(1));
        assert_eq!(votes.len(), 2);
        assert!(cache.is_empty());
        assert!(cache.drain(&hash(1)).is_empty());
    }

    #[test]
    fn top_sorted_descending() {
        let mut cache = VoteCache::new();
        cache.insert(hash(1), rep(1), raw(300), 1000, false);
        cache.insert(hash(2), rep(2), raw(500), 1001, false);
        cache.insert(hash(3), rep(3), raw(100), 1002, false);

        let top = cache.top(2);
        assert_eq!(top, vec![(hash(2), raw(500)), (hash(1), raw(300))]);
    }

    #[test]
    fn voter_limit_evicts_lightest() {
        let mut cache = VoteCache::new();
        for i in 0..MAX_VOTERS_PER_HASH {
            cache.insert(hash(1), rep(i as u8), raw(100 + i as u128), 1000, false);
        }
        // Heavier newcomer replaces the lightest (weight 100).
        cache.insert(hash(1), rep(200), raw(10_000), 1000, false);
        let (tally, _) = cache.tally(&hash(1));
        assert!(tally > raw(10_000));

        // A lighter newcomer is ignored.
        let before = cache.tally(&hash(1));
        cache.insert(hash(1), rep(201), raw(1), 1000, false);
        assert_eq!(cache.tally(&hash(1)), before);
    }

    #[test]
    fn capacity_eviction_prefers_heavier_entries() {
        let mut cache = VoteCache::with_max_size(2);
        cache.insert(hash(1), rep(1), raw(100), 1000, false);
        cache.insert(hash(2), rep(2), raw(200), 1001, false);
        // Full. A heavier entry evicts the lightest hash.
        cache.insert(hash(3), rep(3), raw(300), 1002, false);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.tally(&hash(1)).0, raw(0));
        assert_eq!(cache.tally(&hash(3)).0, raw(300));

        // A lighter entry than everything cached is dropped.
        cache.insert(hash(4), rep(4), raw(10), 1003, false);
        assert_eq!(cache.tally(&hash(4)).0, raw(0));
    }
}
