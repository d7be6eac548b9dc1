//! Statistics collection for the node pipelines.
//!
//! Every admission drop, validation result, transport error, and scan outcome
//! increments a counter keyed by `(StatType, DetailType, Direction)`. Counters
//! are created lazily on first increment and read with relaxed ordering; exact
//! cross-counter consistency is not required for monitoring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Subsystem that emitted a statistic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatType {
    ProcessingQueue,
    BlockProcessor,
    VoteProcessor,
    Ledger,
    Scheduler,
    Backlog,
    FrontierScan,
    Tcp,
    Channel,
    Error,
}

/// Specific event within a subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetailType {
    // Queue admission
    Overfill,
    InsufficientWork,
    // Ledger results
    Progress,
    GapPrevious,
    GapSource,
    GapEpochOpenPending,
    Old,
    BadSignature,
    NegativeSpend,
    Unreceivable,
    Fork,
    OpenedBurnAccount,
    BalanceMismatch,
    RepresentativeMismatch,
    BlockPosition,
    RollbackFailed,
    Rollback,
    // Vote processing
    VoteProcessed,
    VoteOverflow,
    VoteInvalidSignature,
    // Scheduler
    Inserted,
    InsertFailed,
    Activated,
    BootstrapMissing,
    // Backlog
    Triggered,
    Scanned,
    Overflown,
    // Frontier scan
    NextByRequests,
    NextByTimestamp,
    NextNone,
    Process,
    Done,
    DoneRange,
    // TCP fabric
    MaxPerIp,
    MaxPerSubnetwork,
    TcpWriteDrop,
    TcpWriteNoSocketDrop,
    TcpExcluded,
    UnreachableHost,
    KeepaliveSent,
    MergePeer,
}

/// Direction of the event relative to this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

type Key = (StatType, DetailType, Direction);

/// Thread-safe counter matrix shared by every pipeline component.
pub struct Stats {
    counters: RwLock<HashMap<Key, Arc<AtomicU64>>>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Increment a counter by one. Inbound direction.
    pub fn inc(&self, stat_type: StatType, detail: DetailType) {
        self.add(stat_type, detail, Direction::In, 1);
    }

    /// Increment a counter by one with an explicit direction.
    pub fn inc_dir(&self, stat_type: StatType, detail: DetailType, dir: Direction) {
        self.add(stat_type, detail, dir, 1);
    }

    /// Add `value` to a counter, creating it on first use.
    pub fn add(&self, stat_type: StatType, detail: DetailType, dir: Direction, value: u64) {
        let key = (stat_type, detail, dir);
        {
            let counters = self.counters.read().expect("stats lock poisoned");
            if let Some(counter) = counters.get(&key) {
                counter.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().expect("stats lock poisoned");
        counters
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Current value of a counter (inbound direction).
    pub fn count(&self, stat_type: StatType, detail: DetailType) -> u64 {
        self.count_dir(stat_type, detail, Direction::In)
    }

    /// Current value of a counter with an explicit direction.
    pub fn count_dir(&self, stat_type: StatType, detail: DetailType, dir: Direction) -> u64 {
        let counters = self.counters.read().expect("stats lock poisoned");
        counters
            .get(&(stat_type, detail, dir))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Snapshot of every counter, for status reporting.
    pub fn snapshot(&self) -> Vec<(StatType, DetailType, Direction, u64)> {
        let counters = self.counters.read().expect("stats lock poisoned");
        counters
            .iter()
            .map(|(&(t, d, dir), c)| (t, d, dir, c.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
