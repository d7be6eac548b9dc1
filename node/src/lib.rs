//! The Lattice node core.
//!
//! Turns unvalidated inbound traffic into confirmed ledger state: the block
//! processor drains a two-tier queue under a single write transaction, the
//! vote processor verifies and tallies representative votes, the scheduler
//! suite decides which blocks deserve elections, and the backlog and
//! frontier scanners keep the pipeline fed.

pub mod backlog_population;
pub mod block_processor;
pub mod config;
pub mod error;
pub mod frontier_scan;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod processing_queue;
pub mod unchecked;
pub mod vote_processor;
pub mod work;

pub use backlog_population::{BacklogPopulation, BacklogPopulationConfig};
pub use block_processor::{BlockProcessor, BlockProcessorConfig};
pub use config::NodeConfig;
pub use error::NodeError;
pub use frontier_scan::{FrontierScan, FrontierScanConfig};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{Node, NodeStatus};
pub use processing_queue::ProcessingQueue;
pub use unchecked::UncheckedMap;
pub use vote_processor::{VoteProcessor, VoteProcessorConfig};
pub use work::WorkThresholds;
