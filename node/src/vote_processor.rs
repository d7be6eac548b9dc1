//! Vote processor.
//!
//! Multi-threaded verifier/tallyer. Admission is tiered random early
//! detection: as the queue fills, low-weight representatives are dropped
//! first, so the votes that can actually move elections always get through.
//! Verified votes are applied to the election table; votes for hashes with
//! no election land in the vote cache.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddrV6;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{error, trace};

use lattice_consensus::{ElectionTable, OnlineReps, RepTier, RepTiers, Vote, VoteCache};
use lattice_crypto::SignatureChecker;
use lattice_types::{Account, Amount, PublicKey};
use lattice_utils::{unix_now_secs, DetailType, StatType, Stats};

#[derive(Clone, Debug)]
pub struct VoteProcessorConfig {
    /// Absolute queue bound.
    pub max_votes: usize,
    /// Votes drained per batch.
    pub batch_size: usize,
    pub num_threads: usize,
}

impl Default for VoteProcessorConfig {
    fn default() -> Self {
        Self {
            max_votes: 16 * 1024,
            batch_size: 1024,
            num_threads: 1,
        }
    }
}

type QueueEntry = (Vote, SocketAddrV6);

struct Shared {
    config: VoteProcessorConfig,
    stats: Arc<Stats>,
    queue: Mutex<VecDeque<QueueEntry>>,
    condition: Condvar,
    stopped: AtomicBool,
    checker: SignatureChecker,
    tiers: Mutex<RepTiers>,
    weights: Mutex<HashMap<Account, Amount>>,
    online_reps: Arc<Mutex<OnlineReps>>,
    elections: Arc<Mutex<ElectionTable>>,
    vote_cache: Arc<Mutex<VoteCache>>,
    total_processed: AtomicU64,
}

/// The vote pipeline.
pub struct VoteProcessor {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl VoteProcessor {
    pub fn new(
        config: VoteProcessorConfig,
        stats: Arc<Stats>,
        elections: Arc<Mutex<ElectionTable>>,
        vote_cache: Arc<Mutex<VoteCache>>,
        online_reps: Arc<Mutex<OnlineReps>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                stats,
                queue: Mutex::new(VecDeque::new()),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
                checker: SignatureChecker::new(),
                tiers: Mutex::new(RepTiers::new()),
                weights: Mutex::new(HashMap::new()),
                online_reps,
                elections,
                vote_cache,
                total_processed: AtomicU64::new(0),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Set a representative's voting weight (normally sourced from the
    /// ledger's rep weights).
    pub fn set_weight(&self, rep: Account, weight: Amount) {
        self.shared.weights.lock().unwrap().insert(rep, weight);
    }

    /// Recompute the representative tiers from current weights and the
    /// trended online weight.
    pub fn calculate_weights(&self) {
        let weights = self.shared.weights.lock().unwrap();
        let trended = self.shared.online_reps.lock().unwrap().trended();
        self.shared
            .tiers
            .lock()
            .unwrap()
            .calculate_weights(&weights, trended);
    }

    /// Offer a vote for processing. Returns `false` when the vote was
    /// accepted; `true` means it was dropped by admission control.
    pub fn vote(&self, vote: Vote, channel: SocketAddrV6) -> bool {
        let dropped = {
            let mut queue = self.shared.queue.lock().unwrap();
            let size = queue.len();
            if size >= self.shared.config.max_votes {
                true
            } else if !self.should_process(size, &vote.voter) {
                true
            } else {
                queue.push_back((vote, channel));
                false
            }
        };
        if dropped {
            self.shared
                .stats
                .inc(StatType::VoteProcessor, DetailType::VoteOverflow);
        } else {
            self.shared.condition.notify_all();
        }
        dropped
    }

    /// Tiered RED: everyone while the queue is under half; above half the
    /// tier-3-and-below drop out; above three quarters only tier 1 remains.
    fn should_process(&self, queue_size: usize, rep: &Account) -> bool {
        let max = self.shared.config.max_votes;
        if queue_size <= max / 2 {
            return true;
        }
        let tier = self.shared.tiers.lock().unwrap().tier(rep);
        if queue_size <= max * 3 / 4 {
            tier >= RepTier::Tier2
        } else {
            tier == RepTier::Tier1
        }
    }

    pub fn size(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    pub fn half_full(&self) -> bool {
        self.size() >= self.shared.config.max_votes / 2
    }

    pub fn total_processed(&self) -> u64 {
        self.shared.total_processed.load(Ordering::SeqCst)
    }

    /// Wait until the backlog present at the time of the call has been
    /// processed, or the queue empties.
    pub fn flush(&self) {
        let target = self.total_processed() + self.size() as u64;
        let mut queue = self.shared.queue.lock().unwrap();
        while !self.shared.stopped.load(Ordering::SeqCst)
            && !queue.is_empty()
            && self.shared.total_processed.load(Ordering::SeqCst) < target
        {
            let (guard, _) = self
                .shared
                .condition
                .wait_timeout(queue, std::time::Duration::from_millis(50))
                .unwrap();
            queue = guard;
        }
    }

    /// Apply one verified vote to the election table and the vote cache.
    pub fn vote_blocking(&self, vote: &Vote, _channel: &SocketAddrV6) {
        vote_blocking(&self.shared, vote);
    }

    pub fn start(&self) {
        let mut threads = self.threads.lock().unwrap();
        for i in 0..self.shared.config.num_threads {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("vote_proc_{i}"))
                .spawn(move || run(shared))
                .expect("failed to spawn vote processor thread");
            threads.push(handle);
        }
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            assert!(handle.join().is_ok(), "vote processor thread panicked");
        }
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let batch = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if !queue.is_empty() {
                    let take = queue.len().min(shared.config.batch_size);
                    break queue.drain(..take).collect::<VecDeque<QueueEntry>>();
                }
                queue = shared.condition.wait(queue).unwrap();
            }
        };
        verify_votes(&shared, batch);
        shared.condition.notify_all();
    }
}

/// One bulk signature pass over the batch, then tally the valid votes.
fn verify_votes(shared: &Shared, batch: VecDeque<QueueEntry>) {
    let messages: Vec<Vec<u8>> = batch.iter().map(|(vote, _)| vote.signed_message()).collect();
    let keys: Vec<PublicKey> = batch
        .iter()
        .map(|(vote, _)| PublicKey(*vote.voter.as_bytes()))
        .collect();
    let items: Vec<(&[u8], &PublicKey, &lattice_types::Signature)> = batch
        .iter()
        .zip(messages.iter())
        .zip(keys.iter())
        .map(|(((vote, _), message), key)| (message.as_slice(), key, &vote.signature))
        .collect();
    let verified = shared.checker.verify(&items);

    for ((vote, channel), valid) in batch.iter().zip(verified) {
        if valid {
            vote_blocking(shared, vote);
            trace!(voter = %vote.voter, hashes = vote.hashes.len(), "vote processed");
        } else {
            shared
                .stats
                .inc(StatType::VoteProcessor, DetailType::VoteInvalidSignature);
            trace!(voter = %vote.voter, channel = %channel, "invalid vote signature");
        }
        shared.total_processed.fetch_add(1, Ordering::SeqCst);
    }
}

fn vote_blocking(shared: &Shared, vote: &Vote) {
    let weight = shared
        .weights
        .lock()
        .unwrap()
        .get(&vote.voter)
        .copied()
        .unwrap_or(Amount::ZERO);
    shared
        .online_reps
        .lock()
        .unwrap()
        .observe(vote.voter, unix_now_secs());

    for hash in &vote.hashes {
        let routed = shared.route_vote(vote, hash, weight);
        if !routed {
            shared.vote_cache.lock().unwrap().insert(
                *hash,
                vote.voter,
                weight,
                vote.timestamp,
                vote.is_final,
            );
        }
    }
    shared
        .stats
        .inc(StatType::VoteProcessor, DetailType::VoteProcessed);
}

impl Shared {
    fn route_vote(&self, vote: &Vote, hash: &lattice_types::BlockHash, weight: Amount) -> bool {
        self.elections
            .lock()
            .unwrap()
            .vote(vote.voter, hash, weight, vote.timestamp, vote.is_final)
            .is_some()
    }
}
