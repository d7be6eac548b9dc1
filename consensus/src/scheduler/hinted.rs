//! Hinted scheduler — starts elections for blocks whose cached votes
//! already carry serious weight.
//!
//! Votes can arrive before the fork they resolve. Instead of waiting for
//! the block processor to surface the conflict, this scheduler watches the
//! vote cache and starts an election as soon as an entry's tally crosses a
//! fraction of the trended online weight, using table slots reserved for
//! hinted admission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use lattice_ledger::Ledger;
use lattice_types::{Amount, BlockHash};
use lattice_utils::{DetailType, StatType, Stats};
use tracing::{debug, error};

use crate::election::ElectionBehavior;
use crate::online_reps::OnlineReps;
use crate::scheduler::{ExistsAggregate, QueuedView};
use crate::vote_cache::VoteCache;

#[derive(Clone, Debug)]
pub struct HintedSchedulerConfig {
    /// Percent of trended online weight a cached tally must reach.
    pub hint_weight_percent: u128,
    /// Poll period when no notification arrives.
    pub check_interval: Duration,
}

impl Default for HintedSchedulerConfig {
    fn default() -> Self {
        Self {
            hint_weight_percent: 10,
            check_interval: Duration::from_secs(1),
        }
    }
}

pub struct Shared {
    config: HintedSchedulerConfig,
    aggregate: Arc<ExistsAggregate>,
    vote_cache: Arc<Mutex<VoteCache>>,
    online_reps: Arc<Mutex<OnlineReps>>,
    ledger: Arc<Ledger>,
    stats: Arc<Stats>,
    /// Invoked for hinted hashes missing from the ledger.
    bootstrap: Mutex<Option<Box<dyn Fn(BlockHash) + Send + Sync>>>,
    lock: Mutex<()>,
    condition: Condvar,
    stopped: AtomicBool,
}

impl QueuedView for Shared {
    fn queued(&self, _hash: &BlockHash) -> bool {
        // The vote cache is not a pending queue; cached votes must not
        // block other schedulers from admitting the same hash.
        false
    }
}

/// Watches the vote cache and admits heavy entries into reserved election
/// slots.
pub struct HintedScheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl HintedScheduler {
    pub fn new(
        config: HintedSchedulerConfig,
        aggregate: Arc<ExistsAggregate>,
        vote_cache: Arc<Mutex<VoteCache>>,
        online_reps: Arc<Mutex<OnlineReps>>,
        ledger: Arc<Ledger>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                aggregate,
                vote_cache,
                online_reps,
                ledger,
                stats,
                bootstrap: Mutex::new(None),
                lock: Mutex::new(()),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn shared_view(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Callback for hinted hashes the ledger does not know yet.
    pub fn set_bootstrap_callback(&self, callback: Box<dyn Fn(BlockHash) + Send + Sync>) {
        *self.shared.bootstrap.lock().unwrap() = Some(callback);
    }

    /// Wake the scheduler ahead of its poll interval (election slots freed,
    /// cache refilled).
    pub fn notify(&self) {
        self.shared.condition.notify_all();
    }

    /// The minimum cached tally that deserves an election right now.
    pub fn tally_threshold(&self) -> Amount {
        tally_threshold(&self.shared)
    }

    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("sched_hinted".into())
            .spawn(move || run(shared))
            .expect("failed to spawn hinted scheduler thread");
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("hinted scheduler thread panicked");
            }
        }
    }

    /// One admission pass; also used by tests to run without the thread.
    pub fn run_one(&self) -> bool {
        run_one(&self.shared, tally_threshold(&self.shared))
    }
}

fn tally_threshold(shared: &Shared) -> Amount {
    let trended = shared.online_reps.lock().unwrap().trended();
    Amount::raw(trended.number() / 100 * shared.config.hint_weight_percent)
}

fn predicate(shared: &Shared, minimum_tally: Amount) -> bool {
    if shared.aggregate.table().lock().unwrap().vacancy_hinted() <= 0 {
        return false;
    }
    shared
        .vote_cache
        .lock()
        .unwrap()
        .peek(minimum_tally)
        .is_some()
}

fn run(shared: Arc<Shared>) {
    // New cache entries do not notify (they arrive far too often); the
    // interval wait guarantees refills are observed within a second.
    while !shared.stopped.load(Ordering::SeqCst) {
        {
            let guard = shared.lock.lock().unwrap();
            let _unused = shared
                .condition
                .wait_timeout(guard, shared.config.check_interval)
                .unwrap();
        }
        if shared.stopped.load(Ordering::SeqCst) {
            return;
        }
        let minimum_tally = tally_threshold(&shared);
        if predicate(&shared, minimum_tally) {
            run_one(&shared, minimum_tally);
        }
    }
}

fn run_one(shared: &Shared, minimum_tally: Amount) -> bool {
    let (hash, cached_votes) = {
        let mut cache = shared.vote_cache.lock().unwrap();
        match cache.peek(minimum_tally) {
            Some(hash) => (hash, cache.drain(&hash)),
            None => return false,
        }
    };

    let txn = shared.ledger.store().tx_begin_read();
    let Some(block) = shared.ledger.store().block().get(&txn, &hash) else {
        // The voted-on block is missing; ask bootstrap for it instead.
        shared
            .stats
            .inc(StatType::Scheduler, DetailType::BootstrapMissing);
        if let Some(bootstrap) = shared.bootstrap.lock().unwrap().as_ref() {
            bootstrap(hash);
        }
        return false;
    };
    if shared.ledger.block_confirmed(&txn, &hash) {
        return false;
    }
    drop(txn);

    if shared.aggregate.exists(&hash) {
        return false;
    }
    let mut table = shared.aggregate.table().lock().unwrap();
    if table.vacancy_hinted() <= 0 {
        return false;
    }
    let inserted = table.insert(&block, ElectionBehavior::Hinted);
    if let Some(election) = table.election_mut(&hash) {
        election.transition_active();
        for (voter, weight, timestamp, is_final) in cached_votes {
            election.vote(voter, weight, hash, timestamp, is_final);
        }
    }
    if inserted {
        debug!(%hash, "hinted election started");
        shared.stats.inc(StatType::Scheduler, DetailType::Inserted);
    }
    inserted
}
