//! Manual scheduler — elections requested explicitly over RPC.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use lattice_types::{Block, BlockHash};
use lattice_utils::{DetailType, StatType, Stats};
use tracing::error;

use crate::election::ElectionBehavior;
use crate::scheduler::{ExistsAggregate, QueuedView};

pub struct Shared {
    queue: Mutex<VecDeque<Block>>,
    condition: Condvar,
    stopped: AtomicBool,
    aggregate: Arc<ExistsAggregate>,
    stats: Arc<Stats>,
}

impl QueuedView for Shared {
    fn queued(&self, hash: &BlockHash) -> bool {
        self.queue.lock().unwrap().iter().any(|b| b.hash == *hash)
    }
}

/// Admits operator-submitted blocks, FIFO.
pub struct ManualScheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ManualScheduler {
    pub fn new(aggregate: Arc<ExistsAggregate>, stats: Arc<Stats>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
                aggregate,
                stats,
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn shared_view(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    pub fn push(&self, block: Block) {
        self.shared.queue.lock().unwrap().push_back(block);
        self.shared.condition.notify_all();
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("sched_manual".into())
            .spawn(move || run(shared))
            .expect("failed to spawn manual scheduler thread");
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("manual scheduler thread panicked");
            }
        }
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let block = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(block) = queue.pop_front() {
                    break block;
                }
                queue = shared.condition.wait(queue).unwrap();
            }
        };

        if shared.aggregate.exists(&block.hash) {
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
        if table.insert(&block, ElectionBehavior::Manual) {
            if let Some(election) = table.election_mut(&block.hash) {
                election.transition_active();
            }
            shared.stats.inc(StatType::Scheduler, DetailType::Inserted);
        }
    }
}
