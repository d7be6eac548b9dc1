//! Election schedulers.
//!
//! Four peer schedulers share the single election table; each admits blocks
//! when its policy allows. The admission rule is common: a block enters the
//! table only when no scheduler already tracks its hash and the target
//! scheduler's vacancy is positive.

pub mod component;
pub mod hinted;
pub mod manual;
pub mod optimistic;
pub mod priority;

use std::sync::{Arc, Mutex, RwLock, Weak};

use lattice_types::BlockHash;

use crate::election_table::ElectionTable;

pub use component::SchedulerComponent;
pub use hinted::{HintedScheduler, HintedSchedulerConfig};
pub use manual::ManualScheduler;
pub use optimistic::OptimisticScheduler;
pub use priority::PriorityScheduler;

/// A scheduler's view of the blocks it has queued but not yet admitted.
pub trait QueuedView {
    fn queued(&self, hash: &BlockHash) -> bool;
}

/// The aggregate duplicate check: a hash "exists" if the election table or
/// any scheduler queue already tracks it.
pub struct ExistsAggregate {
    table: Arc<Mutex<ElectionTable>>,
    views: RwLock<Vec<Weak<dyn QueuedView + Send + Sync>>>,
}

impl ExistsAggregate {
    pub fn new(table: Arc<Mutex<ElectionTable>>) -> Self {
        Self {
            table,
            views: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, view: Weak<dyn QueuedView + Send + Sync>) {
        self.views.write().unwrap().push(view);
    }

    pub fn exists(&self, hash: &BlockHash) -> bool {
        if self.table.lock().unwrap().exists(hash) {
            return true;
        }
        self.views
            .read()
            .unwrap()
            .iter()
            .filter_map(|view| view.upgrade())
            .any(|view| view.queued(hash))
    }

    pub fn table(&self) -> &Arc<Mutex<ElectionTable>> {
        &self.table
    }
}
