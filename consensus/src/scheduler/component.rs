//! The scheduler component: owns the four schedulers and the aggregate
//! duplicate check over them.

use std::sync::{Arc, Mutex};

use lattice_ledger::Ledger;
use lattice_types::BlockHash;
use lattice_utils::Stats;

use crate::election_table::ElectionTable;
use crate::online_reps::OnlineReps;
use crate::scheduler::hinted::{HintedScheduler, HintedSchedulerConfig};
use crate::scheduler::manual::ManualScheduler;
use crate::scheduler::optimistic::OptimisticScheduler;
use crate::scheduler::priority::PriorityScheduler;
use crate::scheduler::{ExistsAggregate, QueuedView};
use crate::vote_cache::VoteCache;

/// All four schedulers over one election table.
pub struct SchedulerComponent {
    aggregate: Arc<ExistsAggregate>,
    pub priority: PriorityScheduler,
    pub hinted: HintedScheduler,
    pub manual: ManualScheduler,
    pub optimistic: OptimisticScheduler,
}

impl SchedulerComponent {
    pub fn new(
        table: Arc<Mutex<ElectionTable>>,
        ledger: Arc<Ledger>,
        vote_cache: Arc<Mutex<VoteCache>>,
        online_reps: Arc<Mutex<OnlineReps>>,
        hinted_config: HintedSchedulerConfig,
        priority_depth: usize,
        optimistic_depth: usize,
        stats: Arc<Stats>,
    ) -> Self {
        let aggregate = Arc::new(ExistsAggregate::new(table));

        let priority =
            PriorityScheduler::new(priority_depth, Arc::clone(&aggregate), Arc::clone(&stats));
        let hinted = HintedScheduler::new(
            hinted_config,
            Arc::clone(&aggregate),
            vote_cache,
            online_reps,
            Arc::clone(&ledger),
            Arc::clone(&stats),
        );
        let manual = ManualScheduler::new(Arc::clone(&aggregate), Arc::clone(&stats));
        let optimistic =
            OptimisticScheduler::new(optimistic_depth, Arc::clone(&aggregate), ledger, stats);

        let component = Self {
            aggregate,
            priority,
            hinted,
            manual,
            optimistic,
        };
        component.register_views();
        component
    }

    fn register_views(&self) {
        let priority: Arc<dyn QueuedView + Send + Sync> = self.priority.shared_view();
        let hinted: Arc<dyn QueuedView + Send + Sync> = self.hinted.shared_view();
        let manual: Arc<dyn QueuedView + Send + Sync> = self.manual.shared_view();
        let optimistic: Arc<dyn QueuedView + Send + Sync> = self.optimistic.shared_view();
        self.aggregate.register(Arc::downgrade(&priority));
        self.aggregate.register(Arc::downgrade(&hinted));
        self.aggregate.register(Arc::downgrade(&manual));
        self.aggregate.register(Arc::downgrade(&optimistic));
    }

    /// Whether any scheduler or the election table already tracks `hash`.
    pub fn exists(&self, hash: &BlockHash) -> bool {
        self.aggregate.exists(hash)
    }

    pub fn table(&self) -> &Arc<Mutex<ElectionTable>> {
        self.aggregate.table()
    }

    pub fn start(&self) {
        self.priority.start();
        self.hinted.start();
        self.manual.start();
        self.optimistic.start();
    }

    pub fn stop(&self) {
        self.priority.stop();
        self.hinted.stop();
        self.manual.stop();
        self.optimistic.stop();
    }
}
