//! Account-chain ledger for the Lattice node.
//!
//! The node core consumes the ledger through `process`, `successor`,
//! `rollback`, and `block_source`. Validation here goes exactly as deep as
//! the result taxonomy requires: chain position, duplicate detection, source
//! and pending checks, and cheap balance sanity. Full consensus-level
//! validation is the concern of higher layers.

pub mod ledger;
pub mod result;

pub use ledger::{write_tables, Ledger, LedgerError};
pub use result::BlockStatus;
