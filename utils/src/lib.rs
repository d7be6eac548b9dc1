//! Shared utilities for the Lattice node.

pub mod stats;
pub mod time;

pub use stats::{DetailType, Direction, StatType, Stats};
pub use time::unix_now_secs;
