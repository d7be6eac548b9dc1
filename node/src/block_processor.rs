//! Serialized block processor.
//!
//! One worker drains a two-tier queue (forced ahead of normal) and applies
//! blocks against the ledger under a single write transaction per batch.
//! Results feed the unchecked map, the stat counters, and the typed
//! subscription channels; blocking submitters are resolved through a
//! pending-request map keyed by block hash.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use lattice_consensus::{ElectionTable, LocalVoteHistory};
use lattice_ledger::{write_tables, BlockStatus, Ledger};
use lattice_store::WriteTransaction;
use lattice_types::{Block, BlockHash, Epoch};
use lattice_utils::{DetailType, StatType, Stats};

use crate::unchecked::UncheckedMap;
use crate::work::WorkThresholds;

/// Queue depth above which the worker logs progress lines.
const LOG_QUEUE_DEPTH: usize = 64;
/// Minimum interval between progress lines.
const LOG_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct BlockProcessorConfig {
    /// Queue size at which `add` starts rejecting.
    pub full_size: usize,
    /// Blocks processed per batch before the transaction is committed.
    pub batch_size: usize,
    /// Wall-clock bound on one batch.
    pub batch_max_time: Duration,
    /// How long `add_blocking` waits for its result.
    pub block_process_timeout: Duration,
}

impl Default for BlockProcessorConfig {
    fn default() -> Self {
        Self {
            full_size: 65_536,
            batch_size: 256,
            batch_max_time: Duration::from_millis(500),
            block_process_timeout: Duration::from_secs(30),
        }
    }
}

struct QueueState {
    blocks: VecDeque<Block>,
    forced: VecDeque<Block>,
    /// A batch is running; `flush` must wait for it.
    active: bool,
}

impl QueueState {
    fn have_blocks(&self) -> bool {
        !self.blocks.is_empty() || !self.forced.is_empty()
    }
}

type Processed = (BlockStatus, Block);

struct Shared {
    config: BlockProcessorConfig,
    stats: Arc<Stats>,
    ledger: Arc<Ledger>,
    unchecked: Arc<UncheckedMap>,
    work: WorkThresholds,
    elections: Arc<Mutex<ElectionTable>>,
    history: Arc<Mutex<LocalVoteHistory>>,
    state: Mutex<QueueState>,
    condition: Condvar,
    stopped: AtomicBool,
    /// Pending `add_blocking` requests by block hash, resolved after the
    /// batch commits and erased on timeout.
    blocking: Mutex<HashMap<BlockHash, mpsc::SyncSender<Processed>>>,
    processed_subscribers: Mutex<Vec<mpsc::Sender<Processed>>>,
    batch_subscribers: Mutex<Vec<mpsc::Sender<Vec<Processed>>>>,
    next_log: Mutex<Instant>,
}

/// The serialized ledger writer.
pub struct BlockProcessor {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BlockProcessor {
    pub fn new(
        config: BlockProcessorConfig,
        stats: Arc<Stats>,
        ledger: Arc<Ledger>,
        unchecked: Arc<UncheckedMap>,
        work: WorkThresholds,
        elections: Arc<Mutex<ElectionTable>>,
        history: Arc<Mutex<LocalVoteHistory>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                stats,
                ledger,
                unchecked,
                work,
                elections,
                history,
                state: Mutex::new(QueueState {
                    blocks: VecDeque::new(),
                    forced: VecDeque::new(),
                    active: false,
                }),
                condition: Condvar::new(),
                stopped: AtomicBool::new(false),
                blocking: Mutex::new(HashMap::new()),
                processed_subscribers: Mutex::new(Vec::new()),
                batch_subscribers: Mutex::new(Vec::new()),
                next_log: Mutex::new(Instant::now()),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Per-block results, delivered after the batch's transaction commits.
    pub fn subscribe_processed(&self) -> mpsc::Receiver<Processed> {
        let (tx, rx) = mpsc::channel();
        self.shared.processed_subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Whole-batch results, delivered after per-block notifications.
    pub fn subscribe_batch_processed(&self) -> mpsc::Receiver<Vec<Processed>> {
        let (tx, rx) = mpsc::channel();
        self.shared.batch_subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn size(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state.blocks.len() + state.forced.len()
    }

    pub fn full(&self) -> bool {
        self.size() >= self.shared.config.full_size
    }

    pub fn half_full(&self) -> bool {
        self.size() >= self.shared.config.full_size / 2
    }

    /// Queue a block for processing. Rejected (with a counter) when the
    /// queue is full or the work does not meet the entry threshold.
    pub fn add(&self, block: Block) -> bool {
        if self.full() {
            self.shared
                .stats
                .inc(StatType::BlockProcessor, DetailType::Overfill);
            return false;
        }
        if !self.shared.work.validate_entry(&block) {
            self.shared
                .stats
                .inc(StatType::BlockProcessor, DetailType::InsufficientWork);
            return false;
        }
        self.add_impl(block);
        true
    }

    /// Queue a block and wait for its result, up to the configured timeout.
    /// The fullness check is deliberately skipped: blocking submissions are
    /// local and must not be starved by network flood.
    pub fn add_blocking(&self, block: Block) -> Option<BlockStatus> {
        let hash = block.hash;
        let (sender, receiver) = mpsc::sync_channel(1);
        self.shared.blocking.lock().unwrap().insert(hash, sender);
        self.add_impl(block);
        match receiver.recv_timeout(self.shared.config.block_process_timeout) {
            Ok((status, _)) => Some(status),
            Err(_) => {
                self.shared.blocking.lock().unwrap().remove(&hash);
                None
            }
        }
    }

    /// Queue a block ahead of normal traffic; its competitor (if any) is
    /// rolled back before processing.
    pub fn force(&self, block: Block) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.forced.push_back(block);
        }
        self.shared.condition.notify_all();
    }

    fn add_impl(&self, block: Block) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.blocks.push_back(block);
        }
        self.shared.condition.notify_all();
    }

    /// Wait until both queues are empty and no batch is active.
    pub fn flush(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !self.shared.stopped.load(Ordering::SeqCst) && (state.have_blocks() || state.active)
        {
            state = self.shared.condition.wait(state).unwrap();
        }
    }

    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("blck_proc".into())
            .spawn(move || process_blocks(shared))
            .expect("failed to spawn block processor thread");
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.condition.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            assert!(handle.join().is_ok(), "block processor thread panicked");
        }
    }
}

fn process_blocks(shared: Arc<Shared>) {
    let mut state = shared.state.lock().unwrap();
    while !shared.stopped.load(Ordering::SeqCst) {
        if state.have_blocks() {
            state.active = true;
            drop(state);

            let processed = process_batch(&shared);
            publish(&shared, processed);

            state = shared.state.lock().unwrap();
            state.active = false;
            shared.condition.notify_all();
        } else {
            shared.condition.notify_all();
            state = shared.condition.wait(state).unwrap();
        }
    }
}

fn should_log(shared: &Shared) -> bool {
    let mut next_log = shared.next_log.lock().unwrap();
    let now = Instant::now();
    if *next_log <= now {
        *next_log = now + LOG_INTERVAL;
        true
    } else {
        false
    }
}

fn process_batch(shared: &Shared) -> Vec<Processed> {
    let mut processed = Vec::new();
    let txn = shared.ledger.store().tx_begin_write(&write_tables());
    let timer = Instant::now();
    let store_batch_max = shared.ledger.store().max_block_write_batch_num();
    let mut count = 0usize;
    let mut forced_count = 0usize;

    loop {
        let deadline_reached = timer.elapsed() > shared.config.batch_max_time;
        let batch_reached = count >= shared.config.batch_size;
        let store_reached = count >= store_batch_max;
        let next = {
            let mut state = shared.state.lock().unwrap();
            if !state.have_blocks() || deadline_reached || batch_reached || store_reached {
                None
            } else {
                if state.blocks.len() + state.forced.len() > LOG_QUEUE_DEPTH && should_log(shared)
                {
                    info!(
                        blocks = state.blocks.len(),
                        forced = state.forced.len(),
                        "blocks in processing queue"
                    );
                }
                // Forced blocks win every iteration.
                if let Some(block) = state.forced.pop_front() {
                    forced_count += 1;
                    Some((block, true))
                } else {
                    state.blocks.pop_front().map(|block| (block, false))
                }
            }
        };
        let Some((mut block, forced)) = next else {
            break;
        };
        if forced {
            rollback_competitor(shared, &txn, &block);
        }
        count += 1;
        let result = process_one(shared, &txn, &mut block);
        processed.push((result, block));
    }

    drop(txn); // commit before observers run

    if count > 0 && timer.elapsed() > Duration::from_millis(100) {
        debug!(
            count,
            forced = forced_count,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "processed blocks"
        );
    }
    processed
}

/// Roll back whatever currently occupies the forced block's chain position.
fn rollback_competitor(shared: &Shared, txn: &WriteTransaction, block: &Block) {
    let Some(successor) = shared.ledger.successor(txn, &block.qualified_root()) else {
        return;
    };
    if successor.hash == block.hash {
        return;
    }
    info!(
        rolling_back = %successor.hash,
        replacement = %block.hash,
        "rolling back competitor"
    );
    match shared.ledger.rollback(txn, &successor.hash) {
        Err(e) => {
            shared.stats.inc(StatType::Ledger, DetailType::RollbackFailed);
            error!(error = %e, hash = %successor.hash, "rollback failed");
        }
        Ok(rolled_back) => {
            shared.stats.inc(StatType::Ledger, DetailType::Rollback);
            debug!(count = rolled_back.len(), "blocks rolled back");
            let mut history = shared.history.lock().unwrap();
            let mut elections = shared.elections.lock().unwrap();
            for rolled in &rolled_back {
                history.erase(&rolled.root());
                // The election at the forced block's own position survives;
                // it is the one deciding this fork.
                if rolled.qualified_root() != block.qualified_root() {
                    elections.erase(&rolled.qualified_root());
                }
            }
        }
    }
}

fn process_one(shared: &Shared, txn: &WriteTransaction, block: &mut Block) -> BlockStatus {
    let result = shared.ledger.process(txn, block);
    match result {
        BlockStatus::Progress => {
            shared.unchecked.trigger(&block.hash.into());
            /* Sends may satisfy a waiting receive or epoch open keyed by the
            destination account. Skipped at the maximum epoch: a pending entry
            there can no longer trigger a same-epoch open. */
            if block.is_send() && block.epoch() < Epoch::MAX {
                shared.unchecked.trigger(&block.destination_or_link());
            }
        }
        BlockStatus::GapPrevious => {
            debug!(hash = %block.hash, "gap previous");
            shared.unchecked.put(block.previous.into(), block.clone());
            shared.stats.inc(StatType::Ledger, DetailType::GapPrevious);
        }
        BlockStatus::GapSource => {
            debug!(hash = %block.hash, "gap source");
            let source = shared.ledger.block_source(txn, block);
            shared.unchecked.put(source.into(), block.clone());
            shared.stats.inc(StatType::Ledger, DetailType::GapSource);
        }
        BlockStatus::GapEpochOpenPending => {
            debug!(hash = %block.hash, "gap pending entries for epoch open");
            shared.unchecked.put(block.account.into(), block.clone());
            shared
                .stats
                .inc(StatType::Ledger, DetailType::GapEpochOpenPending);
        }
        BlockStatus::Old => {
            shared.stats.inc(StatType::Ledger, DetailType::Old);
        }
        BlockStatus::Fork => {
            shared.stats.inc(StatType::Ledger, DetailType::Fork);
            debug!(hash = %block.hash, root = %block.root(), "fork");
        }
        BlockStatus::BadSignature
        | BlockStatus::NegativeSpend
        | BlockStatus::Unreceivable
        | BlockStatus::OpenedBurnAccount
        | BlockStatus::BalanceMismatch
        | BlockStatus::RepresentativeMismatch
        | BlockStatus::BlockPosition
        | BlockStatus::InsufficientWork => {
            warn!(hash = %block.hash, result = %result, "block rejected");
        }
    }
    shared
        .stats
        .inc(StatType::BlockProcessor, status_detail(result));
    result
}

fn status_detail(status: BlockStatus) -> DetailType {
    match status {
        BlockStatus::Progress => DetailType::Progress,
        BlockStatus::GapPrevious => DetailType::GapPrevious,
        BlockStatus::GapSource => DetailType::GapSource,
        BlockStatus::GapEpochOpenPending => DetailType::GapEpochOpenPending,
        BlockStatus::Old => DetailType::Old,
        BlockStatus::BadSignature => DetailType::BadSignature,
        BlockStatus::NegativeSpend => DetailType::NegativeSpend,
        BlockStatus::Unreceivable => DetailType::Unreceivable,
        BlockStatus::Fork => DetailType::Fork,
        BlockStatus::OpenedBurnAccount => DetailType::OpenedBurnAccount,
        BlockStatus::BalanceMismatch => DetailType::BalanceMismatch,
        BlockStatus::RepresentativeMismatch => DetailType::RepresentativeMismatch,
        BlockStatus::BlockPosition => DetailType::BlockPosition,
        BlockStatus::InsufficientWork => DetailType::InsufficientWork,
    }
}

/// Deliver batch output: blocking submitters first, then per-block
/// subscribers in batch order, then whole-batch subscribers.
fn publish(shared: &Shared, processed: Vec<Processed>) {
    if processed.is_empty() {
        return;
    }
    {
        let mut blocking = shared.blocking.lock().unwrap();
        for (status, block) in &processed {
            if let Some(sender) = blocking.remove(&block.hash) {
                let _ = sender.send((*status, block.clone()));
            }
        }
    }
    {
        let mut subscribers = shared.processed_subscribers.lock().unwrap();
        subscribers.retain(|subscriber| {
            processed
                .iter()
                .all(|item| subscriber.send(item.clone()).is_ok())
        });
    }
    {
        let mut subscribers = shared.batch_subscribers.lock().unwrap();
        subscribers.retain(|subscriber| subscriber.send(processed.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_consensus::ElectionBehavior;
    use lattice_store::{AccountInfo, Store};
    use lattice_types::{Account, Amount, BlockSideband, BlockType, Signature};

    fn account(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    fn open_block(owner: Account, source: BlockHash, balance: u128) -> Block {
        let mut block = Block {
            block_type: BlockType::Open,
            account: owner,
            previous: BlockHash::ZERO,
            representative: account(0xBB),
            balance: Amount::raw(balance),
            destination: Account::ZERO,
            link: source,
            work: 0,
            signature: Signature([1u8; 64]),
            sideband: None,
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    fn send_block(previous: &Block, destination: Account, balance: u128) -> Block {
        let mut block = Block {
            block_type: BlockType::Send,
            account: previous.account,
            previous: previous.hash,
            representative: previous.representative,
            balance: Amount::raw(balance),
            destination,
            link: BlockHash::ZERO,
            work: 0,
            signature: Signature([2u8; 64]),
            sideband: None,
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    struct Fixture {
        processor: BlockProcessor,
        ledger: Arc<Ledger>,
        unchecked: Arc<UncheckedMap>,
        elections: Arc<Mutex<ElectionTable>>,
        history: Arc<Mutex<LocalVoteHistory>>,
        stats: Arc<Stats>,
        /// Head of the seeded account's chain.
        open: Block,
    }

    /// Processor over a ledger seeded with one funded account.
    fn fixture_with_config(config: BlockProcessorConfig) -> Fixture {
        let stats = Arc::new(Stats::new());
        let ledger = Arc::new(Ledger::new(Arc::new(Store::new())));
        let unchecked = Arc::new(UncheckedMap::new(65_536));
        let elections = Arc::new(Mutex::new(ElectionTable::new(64, 50)));
        let history = Arc::new(Mutex::new(LocalVoteHistory::new()));

        let open = {
            let txn = ledger.store().tx_begin_write(&write_tables());
            let genesis = account(0x01);
            let mut genesis_open = open_block(genesis, BlockHash::new([0xFE; 32]), u128::MAX);
            genesis_open.sideband = Some(BlockSideband {
                is_send: false,
                epoch: lattice_types::Epoch::Epoch0,
            });
            ledger.store().block().put(&txn, &genesis_open);
            ledger.store().account().put(
                &txn,
                &genesis,
                &AccountInfo {
                    head: genesis_open.hash,
                    confirmed_frontier: BlockHash::ZERO,
                    representative: genesis_open.representative,
                    balance: genesis_open.balance,
                    block_count: 1,
                },
            );
            let owner = account(0x10);
            let mut send = send_block(&genesis_open, owner, u128::MAX - 10_000);
            assert_eq!(ledger.process(&txn, &mut send), BlockStatus::Progress);
            let mut open = open_block(owner, send.hash, 10_000);
            assert_eq!(ledger.process(&txn, &mut open), BlockStatus::Progress);
            open
        };

        let processor = BlockProcessor::new(
            config,
            Arc::clone(&stats),
            Arc::clone(&ledger),
            Arc::clone(&unchecked),
            WorkThresholds::disabled(),
            Arc::clone(&elections),
            Arc::clone(&history),
        );
        Fixture {
            processor,
            ledger,
            unchecked,
            elections,
            history,
            stats,
            open,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_config(BlockProcessorConfig {
            block_process_timeout: Duration::from_secs(5),
            ..BlockProcessorConfig::default()
        })
    }

    #[test]
    fn add_and_observe_progress() {
        let f = fixture();
        let results = f.processor.subscribe_processed();
        f.processor.start();

        let send = send_block(&f.open, account(0x20), 9_000);
        assert!(f.processor.add(send.clone()));

        let (status, block) = results.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(status, BlockStatus::Progress);
        assert_eq!(block.hash, send.hash);
        f.processor.stop();
    }

    #[test]
    fn every_added_block_emits_exactly_one_result() {
        let f = fixture();
        let results = f.processor.subscribe_processed();
        f.processor.start();

        let send1 = send_block(&f.open, account(0x20), 9_000);
        let send2 = send_block(&send1, account(0x21), 8_000);
        f.processor.add(send1);
        f.processor.add(send2);
        f.processor.flush();
        f.processor.stop();

        let received: Vec<Processed> = results.try_iter().collect();
        assert_eq!(received.len(), 2);
    }

    #[test]
    fn gap_previous_lands_in_unchecked_and_replays() {
        let f = fixture();
        let results = f.processor.subscribe_processed();

        // Feed satisfied unchecked blocks straight back, as the node does.
        // (Testing the full loop without the node wiring.)
        let send1 = send_block(&f.open, account(0x20), 9_000);
        let send2 = send_block(&send1, account(0x21), 8_000);

        f.processor.start();
        f.processor.add(send2.clone());
        let (status, block) = results.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(status, BlockStatus::GapPrevious);
        assert_eq!(block.hash, send2.hash);
        assert_eq!(f.unchecked.len(), 1);

        // The dependency arrives; its trigger surfaces the waiter.
        f.processor.add(send1.clone());
        let (status, block) = results.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(status, BlockStatus::Progress);
        assert_eq!(block.hash, send1.hash);

        let replayed = f.unchecked.trigger(&send1.hash.into());
        assert!(replayed.is_empty(), "trigger already drained during processing");
        assert_eq!(f.unchecked.len(), 0);

        // Re-add the drained block; now it progresses.
        f.processor.add(send2.clone());
        let (status, _) = results.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(status, BlockStatus::Progress);
        f.processor.stop();
    }

    #[test]
    fn forced_block_rolls_back_competitor() {
        let f = fixture();
        let results = f.processor.subscribe_processed();
        f.processor.start();

        // Build a chain send_a -> send_a2 on the seeded account.
        let send_a = send_block(&f.open, account(0x20), 9_000);
        let send_a2 = send_block(&send_a, account(0x21), 8_000);
        f.processor.add(send_a.clone());
        f.processor.add(send_a2.clone());
        f.processor.flush();

        // Elections for both positions; record some vote history.
        {
            let mut elections = f.elections.lock().unwrap();
            elections.insert(&send_a, ElectionBehavior::Priority);
            elections.insert(&send_a2, ElectionBehavior::Priority);
        }
        f.history
            .lock()
            .unwrap()
            .add(send_a2.root(), account(0xEE), send_a2.hash);

        // A fork of send_a wins; force it.
        let send_b = send_block(&f.open, account(0x22), 7_000);
        assert_eq!(send_b.qualified_root(), send_a.qualified_root());
        f.processor.force(send_b.clone());
        f.processor.flush();
        f.processor.stop();

        let statuses: HashMap<BlockHash, BlockStatus> = results
            .try_iter()
            .map(|(status, block)| (block.hash, status))
            .collect();
        assert_eq!(statuses[&send_b.hash], BlockStatus::Progress);

        // Ledger now carries the fork winner.
        let txn = f.ledger.store().tx_begin_read();
        assert!(f.ledger.block_exists(&txn, &send_b.hash));
        assert!(!f.ledger.block_exists(&txn, &send_a.hash));
        assert!(!f.ledger.block_exists(&txn, &send_a2.hash));

        // Dependent election erased, fork-position election kept, history
        // for rolled-back roots gone.
        let elections = f.elections.lock().unwrap();
        assert!(!elections.exists(&send_a2.hash));
        assert!(elections.exists(&send_a.hash) || elections.exists(&send_b.hash));
        assert!(f.history.lock().unwrap().votes(&send_a2.root()).is_empty());
    }

    #[test]
    fn forced_processed_before_normal() {
        let f = fixture();
        let results = f.processor.subscribe_processed();

        // Queue both kinds before the worker starts.
        let normal = send_block(&f.open, account(0x20), 9_000);
        let mut fork = send_block(&f.open, account(0x21), 8_500);
        fork.hash = fork.compute_hash();
        f.processor.add(normal.clone());
        f.processor.force(fork.clone());

        f.processor.start();
        let (_, first) = results.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.hash, fork.hash);
        f.processor.stop();
    }

    #[test]
    fn add_rejects_when_full() {
        let f = fixture_with_config(BlockProcessorConfig {
            full_size: 1,
            ..BlockProcessorConfig::default()
        });
        // Worker not started; first add fills the queue.
        let send1 = send_block(&f.open, account(0x20), 9_000);
        let send2 = send_block(&send1, account(0x21), 8_000);
        assert!(f.processor.add(send1));
        assert!(!f.processor.add(send2));
        assert_eq!(
            f.stats.count(StatType::BlockProcessor, DetailType::Overfill),
            1
        );
    }

    #[test]
    fn add_rejects_insufficient_work() {
        let stats = Arc::new(Stats::new());
        let ledger = Arc::new(Ledger::new(Arc::new(Store::new())));
        let processor = BlockProcessor::new(
            BlockProcessorConfig::default(),
            Arc::clone(&stats),
            ledger,
            Arc::new(UncheckedMap::new(16)),
            WorkThresholds::new(u64::MAX),
            Arc::new(Mutex::new(ElectionTable::new(16, 50))),
            Arc::new(Mutex::new(LocalVoteHistory::new())),
        );
        let block = open_block(account(0x10), BlockHash::new([1u8; 32]), 1);
        assert!(!processor.add(block));
        assert_eq!(
            stats.count(StatType::BlockProcessor, DetailType::InsufficientWork),
            1
        );
    }

    #[test]
    fn add_blocking_returns_result() {
        let f = fixture();
        f.processor.start();
        let send = send_block(&f.open, account(0x20), 9_000);
        assert_eq!(
            f.processor.add_blocking(send),
            Some(BlockStatus::Progress)
        );
        f.processor.stop();
    }

    #[test]
    fn add_blocking_times_out_without_worker() {
        let f = fixture_with_config(BlockProcessorConfig {
            block_process_timeout: Duration::from_millis(100),
            ..BlockProcessorConfig::default()
        });
        let send = send_block(&f.open, account(0x20), 9_000);
        assert_eq!(f.processor.add_blocking(send), None);
        // The pending request was erased on timeout.
        assert!(f.processor.shared.blocking.lock().unwrap().is_empty());
    }

    #[test]
    fn flush_sees_empty_queues() {
        let f = fixture();
        f.processor.start();
        for i in 0..8u8 {
            let send = send_block(&f.open, account(0x20 + i), 9_000 - i as u128);
            f.processor.add(send);
        }
        f.processor.flush();
        assert_eq!(f.processor.size(), 0);
        f.processor.stop();
    }

    #[test]
    fn batch_subscriber_gets_whole_batches() {
        let f = fixture();
        let batches = f.processor.subscribe_batch_processed();
        let send = send_block(&f.open, account(0x20), 9_000);
        f.processor.add(send);
        f.processor.start();
        let batch = batches.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(batch.len(), 1);
        f.processor.stop();
    }
}
