//! Node wiring: construction, lifecycle, and the status surface.
//!
//! Components are built leaves-first and connected through narrow
//! callbacks: satisfied unchecked blocks feed back into the block
//! processor, the priority scheduler's drain clears the backlog latch, and
//! hinted misses surface as bootstrap requests. Callbacks hold weak
//! references so the component graph stays acyclic.

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info};

use lattice_consensus::{
    ElectionTable, HintedSchedulerConfig, LocalVoteHistory, OnlineReps, SchedulerComponent,
    VoteCache,
};
use lattice_ledger::Ledger;
use lattice_network::{
    ChannelRegistry, ExcludedPeers, OutboundBandwidthLimiter,
};
use lattice_store::Store;
use lattice_types::Amount;
use lattice_utils::Stats;

use crate::backlog_population::BacklogPopulation;
use crate::block_processor::BlockProcessor;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::frontier_scan::FrontierScan;
use crate::metrics::NodeMetrics;
use crate::unchecked::UncheckedMap;
use crate::vote_processor::VoteProcessor;
use crate::work::WorkThresholds;

/// Floor for the trended online weight; keeps thresholds sane on small
/// networks.
const ONLINE_WEIGHT_MINIMUM: u128 = 60_000_000;
/// Representatives seen voting within this window count as online.
const ONLINE_WEIGHT_WINDOW_SECS: u64 = 5 * 60;
/// Bound on buffered unchecked blocks.
const UNCHECKED_MAX: usize = 65_536;

/// Sizes and progress counters exposed over RPC.
#[derive(Clone, Debug)]
pub struct NodeStatus {
    pub block_queue_len: usize,
    pub vote_queue_len: usize,
    pub unchecked_len: usize,
    pub election_count: usize,
    pub peer_count: usize,
    pub backlog_overflown: bool,
}

/// A fully wired node core.
pub struct Node {
    pub config: NodeConfig,
    pub stats: Arc<Stats>,
    pub store: Arc<Store>,
    pub ledger: Arc<Ledger>,
    pub unchecked: Arc<UncheckedMap>,
    pub elections: Arc<Mutex<ElectionTable>>,
    pub vote_cache: Arc<Mutex<VoteCache>>,
    pub online_reps: Arc<Mutex<OnlineReps>>,
    pub history: Arc<Mutex<LocalVoteHistory>>,
    pub schedulers: Arc<SchedulerComponent>,
    pub block_processor: Arc<BlockProcessor>,
    pub vote_processor: Arc<VoteProcessor>,
    pub backlog: Arc<BacklogPopulation>,
    pub frontier_scan: Mutex<FrontierScan>,
    pub registry: Arc<ChannelRegistry>,
    pub metrics: NodeMetrics,
    runtime: tokio::runtime::Runtime,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("lattice_net")
            .build()?;

        let stats = Arc::new(Stats::new());
        let store = Arc::new(Store::new());
        let ledger = Arc::new(Ledger::new(Arc::clone(&store)));
        let unchecked = Arc::new(UncheckedMap::new(UNCHECKED_MAX));
        let elections = Arc::new(Mutex::new(ElectionTable::new(
            config.elections.table_size,
            config.elections.hinted_limit_percent,
        )));
        let vote_cache = Arc::new(Mutex::new(VoteCache::new()));
        let online_reps = Arc::new(Mutex::new(OnlineReps::new(
            ONLINE_WEIGHT_WINDOW_SECS,
            Amount::raw(ONLINE_WEIGHT_MINIMUM),
        )));
        let history = Arc::new(Mutex::new(LocalVoteHistory::new()));

        let schedulers = Arc::new(SchedulerComponent::new(
            Arc::clone(&elections),
            Arc::clone(&ledger),
            Arc::clone(&vote_cache),
            Arc::clone(&online_reps),
            HintedSchedulerConfig {
                hint_weight_percent: config.elections.hint_weight_percent,
                ..HintedSchedulerConfig::default()
            },
            config.elections.priority_depth,
            config.elections.optimistic_depth,
            Arc::clone(&stats),
        ));

        let block_processor = Arc::new(BlockProcessor::new(
            config.block_processor_config(),
            Arc::clone(&stats),
            Arc::clone(&ledger),
            Arc::clone(&unchecked),
            WorkThresholds::new(config.work_threshold),
            Arc::clone(&elections),
            Arc::clone(&history),
        ));

        let vote_processor = Arc::new(VoteProcessor::new(
            config.vote_processor_config(),
            Arc::clone(&stats),
            Arc::clone(&elections),
            Arc::clone(&vote_cache),
            Arc::clone(&online_reps),
        ));

        let backlog = Arc::new(BacklogPopulation::new(
            config.backlog_config(),
            Arc::clone(&ledger),
            Arc::clone(&schedulers),
            Arc::clone(&stats),
        ));

        let frontier_scan = Mutex::new(FrontierScan::new(
            config.frontier_scan_config(),
            Arc::clone(&stats),
        ));

        let excluded = Arc::new(ExcludedPeers::new());
        let limiter = Arc::new(OutboundBandwidthLimiter::new(config.bandwidth_limits()));
        let registry = ChannelRegistry::new(
            config.registry_config(),
            Arc::clone(&stats),
            Arc::clone(&store),
            limiter,
            excluded,
        );

        // Satisfied unchecked blocks re-enter the pipeline.
        {
            let processor: Weak<BlockProcessor> = Arc::downgrade(&block_processor);
            unchecked.set_satisfied_observer(Box::new(move |block| {
                if let Some(processor) = processor.upgrade() {
                    debug!(hash = %block.hash, "unchecked block satisfied");
                    processor.add(block);
                }
            }));
        }

        // The priority scheduler's drain clears the backlog overflow latch.
        {
            let backlog_weak: Weak<BacklogPopulation> = Arc::downgrade(&backlog);
            schedulers.priority.set_drained_observer(Box::new(move || {
                if let Some(backlog) = backlog_weak.upgrade() {
                    backlog.notify_drained();
                }
            }));
        }

        // Hinted hashes missing from the ledger become bootstrap requests.
        schedulers
            .hinted
            .set_bootstrap_callback(Box::new(move |hash| {
                debug!(%hash, "requesting bootstrap of hinted block");
            }));

        Ok(Arc::new(Self {
            config,
            stats,
            store,
            ledger,
            unchecked,
            elections,
            vote_cache,
            online_reps,
            history,
            schedulers,
            block_processor,
            vote_processor,
            backlog,
            frontier_scan,
            registry,
            metrics: NodeMetrics::new(),
            runtime,
        }))
    }

    /// Start every pipeline: processors, schedulers, backlog, and the
    /// channel fabric timers.
    pub fn start(&self) {
        info!("starting node core");
        self.block_processor.start();
        self.vote_processor.start();
        self.schedulers.start();
        self.backlog.start();
        {
            let _guard = self.runtime.enter();
            self.registry.start();
        }
    }

    /// Stop in dependency order; queued work is drained or dropped per
    /// component policy.
    pub fn stop(&self) {
        info!("stopping node core");
        self.backlog.stop();
        self.schedulers.stop();
        self.vote_processor.stop();
        self.block_processor.stop();
        self.registry.stop();
    }

    /// Block until both processors have drained their queues.
    pub fn flush(&self) {
        self.block_processor.flush();
        self.vote_processor.flush();
    }

    /// Snapshot sizes for the RPC status surface; refreshes the metrics
    /// gauges as a side effect.
    pub fn status(&self) -> NodeStatus {
        let status = NodeStatus {
            block_queue_len: self.block_processor.size(),
            vote_queue_len: self.vote_processor.size(),
            unchecked_len: self.unchecked.len(),
            election_count: self.elections.lock().unwrap().len(),
            peer_count: self.registry.len(),
            backlog_overflown: self.backlog.overflown(),
        };
        self.metrics.block_queue_len.set(status.block_queue_len as i64);
        self.metrics.vote_queue_len.set(status.vote_queue_len as i64);
        self.metrics.unchecked_len.set(status.unchecked_len as i64);
        self.metrics.election_count.set(status.election_count as i64);
        self.metrics.peer_count.set(status.peer_count as i64);
        status
    }
}
