//! Storage layer for the Lattice node.
//!
//! The core consumes the store through a narrow surface: read/write
//! transactions scoped to a table set, per-table access objects, and the
//! write batch limit. The backing here is in-memory; the physical on-disk
//! format is outside the node core's contract.

pub mod account;
pub mod block;
pub mod peer;
pub mod pending;
pub mod transaction;

use std::sync::Mutex;

pub use account::{AccountInfo, AccountTable};
pub use block::BlockTable;
pub use peer::{EndpointKey, PeerTable};
pub use pending::{PendingKey, PendingTable};
pub use transaction::{ReadTransaction, Table, Transaction, WriteTransaction};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry not found")]
    NotFound,

    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Upper bound on blocks written in a single batch transaction.
const MAX_BLOCK_WRITE_BATCH_NUM: usize = 65_535;

/// The node's store: per-table access behind read/write transactions.
///
/// A write transaction is exclusive process-wide; readers are not blocked
/// (tables use their own interior locks).
pub struct Store {
    write_lock: Mutex<()>,
    blocks: BlockTable,
    accounts: AccountTable,
    pending: PendingTable,
    peers: PeerTable,
}

impl Store {
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            blocks: BlockTable::new(),
            accounts: AccountTable::new(),
            pending: PendingTable::new(),
            peers: PeerTable::new(),
        }
    }

    /// Begin a read transaction.
    pub fn tx_begin_read(&self) -> ReadTransaction<'_> {
        ReadTransaction::new()
    }

    /// Begin a write transaction over the given tables. Blocks until the
    /// current writer (if any) commits.
    pub fn tx_begin_write(&self, tables: &[Table]) -> WriteTransaction<'_> {
        let guard = self.write_lock.lock().expect("store write lock poisoned");
        WriteTransaction::new(guard, tables)
    }

    /// Maximum number of blocks one batch may write before the transaction
    /// must be committed.
    pub fn max_block_write_batch_num(&self) -> usize {
        MAX_BLOCK_WRITE_BATCH_NUM
    }

    pub fn block(&self) -> &BlockTable {
        &self.blocks
    }

    pub fn account(&self) -> &AccountTable {
        &self.accounts
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn peer(&self) -> &PeerTable {
        &self.peers
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn write_transactions_are_exclusive() {
        let store = Arc::new(Store::new());
        let started = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let txn = store.tx_begin_write(&[Table::Blocks]);

        let store2 = Arc::clone(&store);
        let started2 = Arc::clone(&started);
        let handle = std::thread::spawn(move || {
            let _txn = store2.tx_begin_write(&[Table::Accounts]);
            started2.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!started.load(std::sync::atomic::Ordering::SeqCst));

        drop(txn);
        handle.join().unwrap();
        assert!(started.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn readers_do_not_block_each_other() {
        let store = Store::new();
        let _r1 = store.tx_begin_read();
        let _r2 = store.tx_begin_read();
    }

    #[test]
    fn batch_limit_is_positive() {
        let store = Store::new();
        assert!(store.max_block_write_batch_num() > 0);
    }
}
