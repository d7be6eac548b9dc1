//! Consensus for the Lattice node.
//!
//! Elections resolve forks by representative voting. This crate holds the
//! vote data model, the pre-election vote cache, the bounded election table,
//! the four election schedulers that feed it, and the weight bookkeeping the
//! vote pipeline depends on.

pub mod election;
pub mod election_table;
pub mod error;
pub mod online_reps;
pub mod rep_tiers;
pub mod scheduler;
pub mod vote;
pub mod vote_cache;
pub mod vote_history;

pub use election::{Election, ElectionBehavior, ElectionState};
pub use election_table::ElectionTable;
pub use error::ConsensusError;
pub use online_reps::OnlineReps;
pub use rep_tiers::{RepTier, RepTiers};
pub use scheduler::{
    HintedScheduler, HintedSchedulerConfig, ManualScheduler, OptimisticScheduler,
    PriorityScheduler, SchedulerComponent,
};
pub use vote::Vote;
pub use vote_cache::VoteCache;
pub use vote_history::LocalVoteHistory;
