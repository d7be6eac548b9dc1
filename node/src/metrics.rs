//! Prometheus metrics for the node pipelines.
//!
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] the RPC
//! `/metrics` endpoint encodes into the text exposition format. Gauges are
//! refreshed from component size queries by [`crate::node::Node::status`].

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

/// Node-level Prometheus metrics.
pub struct NodeMetrics {
    pub registry: Registry,

    /// Total blocks that entered the processing pipeline.
    pub blocks_processed: IntCounter,
    /// Total votes drained from the vote queue.
    pub votes_processed: IntCounter,

    /// Current block queue depth (normal + forced).
    pub block_queue_len: IntGauge,
    /// Current vote queue depth.
    pub vote_queue_len: IntGauge,
    /// Blocks waiting on a dependency.
    pub unchecked_len: IntGauge,
    /// Active elections.
    pub election_count: IntGauge,
    /// Connected peers.
    pub peer_count: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let blocks_processed = register_int_counter_with_registry!(
            Opts::new(
                "lattice_blocks_processed_total",
                "Total blocks processed by this node"
            ),
            registry
        )
        .expect("failed to register blocks_processed counter");

        let votes_processed = register_int_counter_with_registry!(
            Opts::new(
                "lattice_votes_processed_total",
                "Total votes processed by this node"
            ),
            registry
        )
        .expect("failed to register votes_processed counter");

        let block_queue_len = register_int_gauge_with_registry!(
            Opts::new("lattice_block_queue_len", "Blocks waiting to be processed"),
            registry
        )
        .expect("failed to register block_queue_len gauge");

        let vote_queue_len = register_int_gauge_with_registry!(
            Opts::new("lattice_vote_queue_len", "Votes waiting to be processed"),
            registry
        )
        .expect("failed to register vote_queue_len gauge");

        let unchecked_len = register_int_gauge_with_registry!(
            Opts::new("lattice_unchecked_len", "Blocks awaiting dependencies"),
            registry
        )
        .expect("failed to register unchecked_len gauge");

        let election_count = register_int_gauge_with_registry!(
            Opts::new("lattice_election_count", "Active elections"),
            registry
        )
        .expect("failed to register election_count gauge");

        let peer_count = register_int_gauge_with_registry!(
            Opts::new("lattice_peer_count", "Connected peers"),
            registry
        )
        .expect("failed to register peer_count gauge");

        Self {
            registry,
            blocks_processed,
            votes_processed,
            block_queue_len,
            vote_queue_len,
            unchecked_len,
            election_count,
            peer_count,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_collision() {
        let metrics = NodeMetrics::new();
        metrics.blocks_processed.inc();
        metrics.block_queue_len.set(42);
        let families = metrics.registry.gather();
        assert!(!families.is_empty());
    }
}
