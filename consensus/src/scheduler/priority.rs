//! Priority scheduler — admits backlog blocks by account balance.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use lattice_types::{Amount, Block, BlockHash};
use lattice_utils::{DetailType, StatType, Stats};
use tracing::error;

use crate::election::ElectionBehavior;
use crate::scheduler::{ExistsAggregate, QueuedView};

struct Entry {
    block: Block,
    priority: Amount,
}

struct Queue {
    /// Sorted descending by priority.
    entries: VecDeque<Entry>,
}

impl Queue {
    fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.iter().any(|e| e.block.hash == *hash)
    }
}

pub struct Shared {
    queue: Mutex<Queue>,
    condition: Condvar,
    stopped: AtomicBool,
    max_queue: usize,
    aggregate: Arc<ExistsAggregate>,
    stats: Arc<Stats>,
    /// Fired when the worker empties the queue; the backlog uses this to
    /// clear its overflow latch.
    drained_observer: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl QueuedView for Shared {
    fn queued(&self, hash: &BlockHash) -> bool {
        self.queue.lock().unwrap().contains(hash)
    }
}

/// Consumes the backlog and admits blocks to the election table, heaviest
/// account balance first.
pub struct PriorityScheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PriorityScheduler {
    pub fn new(max_queue: usize, aggregate: Arc<ExistsAggregate>, stats: Arc<Stats>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    entries: VecDeque::new(),
                }),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
                max_queue,
                aggregate,
                stats,
                drained_observer: Mutex::new(None),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn shared_view(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Observer fired whenever the worker drains the queue empty.
    pub fn set_drained_observer(&self, observer: Box<dyn Fn() + Send + Sync>) {
        *self.shared.drained_observer.lock().unwrap() = Some(observer);
    }

    /// Offer a block with its account balance as priority. Returns `true`
    /// when the queue overflowed (the lightest entry was discarded).
    pub fn push(&self, block: Block, priority: Amount) -> bool {
        let mut overflow = false;
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.contains(&block.hash) {
                return false;
            }
            let position = queue
                .entries
                .iter()
                .position(|e| e.priority < priority)
                .unwrap_or(queue.entries.len());
            queue.entries.insert(position, Entry { block, priority });
            if queue.entries.len() > self.shared.max_queue {
                queue.entries.pop_back();
                overflow = true;
            }
        }
        if overflow {
            self.shared
                .stats
                .inc(StatType::Scheduler, DetailType::Overfill);
        }
        self.shared.condition.notify_all();
        overflow
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("sched_priority".into())
            .spawn(move || run(shared))
            .expect("failed to spawn priority scheduler thread");
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("priority scheduler thread panicked");
            }
        }
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let entry = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(entry) = queue.entries.pop_front() {
                    break entry;
                }
                queue = shared.condition.wait(queue).unwrap();
            }
        };

        admit(&shared, &entry.block);

        let drained = shared.queue.lock().unwrap().entries.is_empty();
        if drained {
            if let Some(observer) = shared.drained_observer.lock().unwrap().as_ref() {
                observer();
            }
        }
    }
}

fn admit(shared: &Shared, block: &Block) {
    if shared.aggregate.exists(&block.hash) {
        shared
            .stats
            .inc(StatType::Scheduler, DetailType::InsertFailed);
        return;
    }
    let mut table = shared.aggregate.table().lock().unwrap();
    if table.vacancy() <= 0 {
        shared
            .stats
            .inc(StatType::Scheduler, DetailType::InsertFailed);
        return;
    }
    if table.insert(block, ElectionBehavior::Priority) {
        if let Some(election) = table.election_mut(&block.hash) {
            election.transition_active();
        }
        shared.stats.inc(StatType::Scheduler, DetailType::Inserted);
    }
}
