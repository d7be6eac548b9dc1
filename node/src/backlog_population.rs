//! Backlog population — feeds unconfirmed frontiers to the schedulers.
//!
//! A single worker scans the account table for chains whose head is ahead
//! of the confirmed frontier and offers them to the priority scheduler
//! (and the optimistic scheduler). The worker always runs so a manual
//! trigger is serviced even when ongoing population is disabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error};

use lattice_consensus::SchedulerComponent;
use lattice_ledger::Ledger;
use lattice_types::Account;
use lattice_utils::{DetailType, StatType, Stats};

#[derive(Clone, Debug)]
pub struct BacklogPopulationConfig {
    /// Whether the periodic scan runs without explicit triggers.
    pub enabled: bool,
    pub delay_between_runs: Duration,
    /// Accounts fetched per store read.
    pub batch_size: usize,
}

impl Default for BacklogPopulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_between_runs: Duration::from_secs(300),
            batch_size: 10_000,
        }
    }
}

struct Flags {
    /// Manual trigger, serviced even when ongoing population is disabled.
    triggered: bool,
    /// Latched when the priority queue overflowed; pauses runs until the
    /// scheduler signals drain.
    overflown: bool,
}

struct Shared {
    config: BacklogPopulationConfig,
    ledger: Arc<Ledger>,
    schedulers: Arc<SchedulerComponent>,
    stats: Arc<Stats>,
    flags: Mutex<Flags>,
    condition: Condvar,
    stopped: AtomicBool,
}

/// The backlog scanner.
pub struct BacklogPopulation {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BacklogPopulation {
    pub fn new(
        config: BacklogPopulationConfig,
        ledger: Arc<Ledger>,
        schedulers: Arc<SchedulerComponent>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                ledger,
                schedulers,
                stats,
                flags: Mutex::new(Flags {
                    triggered: false,
                    overflown: false,
                }),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Request an immediate scan (RPC surface). Works even when ongoing
    /// population is disabled.
    pub fn trigger(&self) {
        {
            let mut flags = self.shared.flags.lock().unwrap();
            flags.triggered = true;
        }
        self.shared.stats.inc(StatType::Backlog, DetailType::Triggered);
        self.shared.condition.notify_all();
    }

    /// External-change notification: re-check the predicate early.
    pub fn notify(&self) {
        self.shared.condition.notify_all();
    }

    /// The priority scheduler drained; clear the overflow latch so runs
    /// resume.
    pub fn notify_drained(&self) {
        {
            let mut flags = self.shared.flags.lock().unwrap();
            flags.overflown = false;
        }
        self.shared.condition.notify_all();
    }

    pub fn overflown(&self) -> bool {
        self.shared.flags.lock().unwrap().overflown
    }

    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("backlog_pop".into())
            .spawn(move || run(shared))
            .expect("failed to spawn backlog population thread");
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("backlog population thread panicked");
            }
        }
    }

    /// One scan pass; exposed for tests and the RPC status surface.
    pub fn populate_backlog(&self) -> bool {
        populate_backlog(&self.shared)
    }
}

fn run(shared: Arc<Shared>) {
    while !shared.stopped.load(Ordering::SeqCst) {
        let should_run = {
            let mut flags = shared.flags.lock().unwrap();
            let (flags_out, _) = shared
                .condition
                .wait_timeout(flags, shared.config.delay_between_runs)
                .unwrap();
            flags = flags_out;
            if shared.stopped.load(Ordering::SeqCst) {
                return;
            }
            if flags.triggered {
                flags.triggered = false;
                true
            } else {
                shared.config.enabled && !flags.overflown
            }
        };
        if should_run {
            let overflown = populate_backlog(&shared);
            if overflown {
                shared.stats.inc(StatType::Backlog, DetailType::Overflown);
                shared.flags.lock().unwrap().overflown = true;
            }
        }
    }
}

/// Scan the account table for unconfirmed frontiers. Returns whether the
/// priority queue overflowed.
fn populate_backlog(shared: &Shared) -> bool {
    let mut overflown = false;
    let mut scanned = 0usize;
    let mut activated = 0usize;
    let mut next = Account::ZERO;
    loop {
        let batch = {
            let txn = shared.ledger.store().tx_begin_read();
            shared
                .ledger
                .store()
                .account()
                .range(&txn, next, shared.config.batch_size)
        };
        if batch.is_empty() {
            break;
        }
        let last = batch.last().map(|(account, _)| *account);
        for (account, info) in batch.iter() {
            scanned += 1;
            if info.head != info.confirmed_frontier {
                let block = {
                    let txn = shared.ledger.store().tx_begin_read();
                    shared.ledger.store().block().get(&txn, &info.head)
                };
                if let Some(block) = block {
                    activated += 1;
                    overflown |= shared.schedulers.priority.push(block, info.balance);
                    shared.schedulers.optimistic.activate(account, info);
                }
            }
        }
        match last.and_then(|account| account.increment()) {
            Some(resume) => next = resume,
            None => break,
        }
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }
    }
    shared
        .stats
        .add(StatType::Backlog, DetailType::Scanned, lattice_utils::Direction::In, scanned as u64);
    debug!(scanned, activated, overflown, "backlog populated");
    overflown
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_consensus::{
        ElectionTable, HintedSchedulerConfig, OnlineReps, VoteCache,
    };
    use lattice_ledger::write_tables;
    use lattice_store::{AccountInfo, Store};
    use lattice_types::{Amount, Block, BlockHash, BlockSideband, BlockType, Epoch, Signature};

    fn frontier_block(byte: u8) -> Block {
        let mut block = Block {
            block_type: BlockType::Open,
            account: Account::new([byte; 32]),
            previous: BlockHash::ZERO,
            representative: Account::new([0xBB; 32]),
            balance: Amount::raw(byte as u128 * 100),
            destination: Account::ZERO,
            link: BlockHash::new([0xFE; 32]),
            work: 0,
            signature: Signature([1u8; 64]),
            sideband: Some(BlockSideband {
                is_send: false,
                epoch: Epoch::Epoch0,
            }),
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    struct Fixture {
        backlog: BacklogPopulation,
        ledger: Arc<Ledger>,
        schedulers: Arc<SchedulerComponent>,
    }

    fn fixture(priority_depth: usize) -> Fixture {
        let stats = Arc::new(Stats::new());
        let ledger = Arc::new(Ledger::new(Arc::new(Store::new())));
        let table = Arc::new(Mutex::new(ElectionTable::new(64, 50)));
        let schedulers = Arc::new(SchedulerComponent::new(
            table,
            Arc::clone(&ledger),
            Arc::new(Mutex::new(VoteCache::new())),
            Arc::new(Mutex::new(OnlineReps::new(300, Amount::raw(1000)))),
            HintedSchedulerConfig::default(),
            priority_depth,
            64,
            Arc::clone(&stats),
        ));
        let backlog = BacklogPopulation::new(
            BacklogPopulationConfig {
                enabled: true,
                delay_between_runs: Duration::from_millis(50),
                batch_size: 4,
            },
            Arc::clone(&ledger),
            Arc::clone(&schedulers),
            stats,
        );
        Fixture {
            backlog,
            ledger,
            schedulers,
        }
    }

    fn seed_account(ledger: &Ledger, byte: u8, confirmed: bool) {
        let block = frontier_block(byte);
        let txn = ledger.store().tx_begin_write(&write_tables());
        ledger.store().block().put(&txn, &block);
        ledger.store().account().put(
            &txn,
            &block.account,
            &AccountInfo {
                head: block.hash,
                confirmed_frontier: if confirmed { block.hash } else { BlockHash::ZERO },
                representative: block.representative,
                balance: block.balance,
                block_count: 1,
            },
        );
    }

    #[test]
    fn offers_only_unconfirmed_frontiers() {
        let f = fixture(64);
        seed_account(&f.ledger, 1, false);
        seed_account(&f.ledger, 2, true);
        seed_account(&f.ledger, 3, false);

        let overflown = f.backlog.populate_backlog();
        assert!(!overflown);
        assert_eq!(f.schedulers.priority.len(), 2);
        assert_eq!(f.schedulers.optimistic.len(), 2);
    }

    #[test]
    fn overflow_is_latched_until_drain() {
        let f = fixture(1);
        seed_account(&f.ledger, 1, false);
        seed_account(&f.ledger, 2, false);
        seed_account(&f.ledger, 3, false);

        // Depth 1 priority queue overflows with three candidates.
        let overflown = f.backlog.populate_backlog();
        assert!(overflown);

        // The run loop latches it; simulate one loop decision.
        f.backlog.shared.flags.lock().unwrap().overflown = true;
        assert!(f.backlog.overflown());
        f.backlog.notify_drained();
        assert!(!f.backlog.overflown());
    }

    #[test]
    fn trigger_runs_even_when_disabled() {
        let stats = Arc::new(Stats::new());
        let ledger = Arc::new(Ledger::new(Arc::new(Store::new())));
        let table = Arc::new(Mutex::new(ElectionTable::new(64, 50)));
        let schedulers = Arc::new(SchedulerComponent::new(
            table,
            Arc::clone(&ledger),
            Arc::new(Mutex::new(VoteCache::new())),
            Arc::new(Mutex::new(OnlineReps::new(300, Amount::raw(1000)))),
            HintedSchedulerConfig::default(),
            64,
            64,
            Arc::clone(&stats),
        ));
        seed_account(&ledger, 1, false);
        let backlog = BacklogPopulation::new(
            BacklogPopulationConfig {
                enabled: false,
                delay_between_runs: Duration::from_millis(20),
                batch_size: 4,
            },
            ledger,
            Arc::clone(&schedulers),
            stats,
        );

        backlog.start();
        // Without a trigger nothing is scanned.
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(schedulers.priority.len(), 0);

        backlog.trigger();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline && schedulers.priority.len() == 0 {
            std::thread::sleep(Duration::from_millis(10));
        }
        backlog.stop();
        assert_eq!(schedulers.priority.len(), 1);
    }
}
