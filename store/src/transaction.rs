//! Store transactions.
//!
//! A read transaction is a marker proving the caller went through the store;
//! a write transaction additionally holds the process-wide writer lock and
//! the set of tables it is allowed to touch. Mutating table methods take a
//! `&WriteTransaction` so a writer cannot be forged.

use std::sync::MutexGuard;

/// The tables the store manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    Accounts,
    Blocks,
    Frontiers,
    Pending,
    Peers,
}

/// Marker for any transaction (read or write).
pub trait Transaction {}

/// A read transaction. Cheap, concurrent, never blocks writers.
pub struct ReadTransaction<'a> {
    _marker: std::marker::PhantomData<&'a ()>,
}

impl ReadTransaction<'_> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl Transaction for ReadTransaction<'_> {}

/// An exclusive write transaction scoped to a table set. Commits on drop.
pub struct WriteTransaction<'a> {
    _guard: MutexGuard<'a, ()>,
    tables: Vec<Table>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(guard: MutexGuard<'a, ()>, tables: &[Table]) -> Self {
        Self {
            _guard: guard,
            tables: tables.to_vec(),
        }
    }

    /// Whether this transaction was opened over `table`.
    pub fn covers(&self, table: Table) -> bool {
        self.tables.contains(&table)
    }
}

impl Transaction for WriteTransaction<'_> {}
