//! Optimistic scheduler — speculatively elects account frontiers.
//!
//! Accounts whose frontier runs ahead of their confirmed frontier are good
//! election candidates even without an observed conflict: confirming the
//! head implicitly confirms the chain below it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use lattice_ledger::Ledger;
use lattice_store::AccountInfo;
use lattice_types::{Account, BlockHash};
use lattice_utils::{DetailType, StatType, Stats};
use tracing::error;

use crate::election::ElectionBehavior;
use crate::scheduler::{ExistsAggregate, QueuedView};

pub struct Shared {
    queue: Mutex<VecDeque<BlockHash>>,
    condition: Condvar,
    stopped: AtomicBool,
    max_queue: usize,
    aggregate: Arc<ExistsAggregate>,
    ledger: Arc<Ledger>,
    stats: Arc<Stats>,
}

impl QueuedView for Shared {
    fn queued(&self, hash: &BlockHash) -> bool {
        self.queue.lock().unwrap().iter().any(|h| h == hash)
    }
}

/// Admits unconfirmed frontier blocks speculatively.
pub struct OptimisticScheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl OptimisticScheduler {
    pub fn new(
        max_queue: usize,
        aggregate: Arc<ExistsAggregate>,
        ledger: Arc<Ledger>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
                max_queue,
                aggregate,
                ledger,
                stats,
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn shared_view(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Offer an account's frontier. Ignored unless the head is ahead of the
    /// confirmed frontier. Returns whether the frontier was queued.
    pub fn activate(&self, _account: &Account, info: &AccountInfo) -> bool {
        if info.head == info.confirmed_frontier {
            return false;
        }
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.len() >= self.shared.max_queue || queue.contains(&info.head) {
                return false;
            }
            queue.push_back(info.head);
        }
        self.shared.condition.notify_all();
        true
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("sched_optimistic".into())
            .spawn(move || run(shared))
            .expect("failed to spawn optimistic scheduler thread");
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("optimistic scheduler thread panicked");
            }
        }
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let hash = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(hash) = queue.pop_front() {
                    break hash;
                }
                queue = shared.condition.wait(queue).unwrap();
            }
        };

        let block = {
            let txn = shared.ledger.store().tx_begin_read();
            if shared.ledger.block_confirmed(&txn, &hash) {
                continue;
            }
            shared.ledger.store().block().get(&txn, &hash)
        };
        let Some(block) = block else { continue };

        if shared.aggregate.exists(&hash) {
            shared
                .stats
                .inc(StatType::Scheduler, DetailType::InsertFailed);
            continue;
        }
        let mut table = shared.aggregate.table().lock().unwrap();
        if table.vacancy() <= 0 {
            shared
                .stats
                .inc(StatType::Scheduler, DetailType::InsertFailed);
            continue;
        }
        if table.insert(&block, ElectionBehavior::Optimistic) {
            if let Some(election) = table.election_mut(&hash) {
                election.transition_active();
            }
            shared.stats.inc(StatType::Scheduler, DetailType::Inserted);
        }
    }
}
