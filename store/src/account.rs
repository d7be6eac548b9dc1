//! Account table: per-account chain metadata.

use std::collections::BTreeMap;
use std::sync::RwLock;

use lattice_types::{Account, Amount, BlockHash};

use crate::transaction::{Table, Transaction, WriteTransaction};

/// Chain metadata for one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    /// Head block of the chain.
    pub head: BlockHash,
    /// Highest confirmed block of the chain; zero when nothing is confirmed.
    pub confirmed_frontier: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    pub block_count: u64,
}

/// Accounts ordered by identifier, so range scans over the account space are
/// cheap (backlog population, frontier requests).
pub struct AccountTable {
    inner: RwLock<BTreeMap<Account, AccountInfo>>,
}

impl AccountTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, _txn: &dyn Transaction, account: &Account) -> Option<AccountInfo> {
        self.inner.read().unwrap().get(account).cloned()
    }

    pub fn put(&self, txn: &WriteTransaction, account: &Account, info: &AccountInfo) {
        debug_assert!(txn.covers(Table::Accounts) || txn.covers(Table::Frontiers));
        self.inner.write().unwrap().insert(*account, info.clone());
    }

    pub fn del(&self, txn: &WriteTransaction, account: &Account) {
        debug_assert!(txn.covers(Table::Accounts) || txn.covers(Table::Frontiers));
        self.inner.write().unwrap().remove(account);
    }

    /// Up to `max` accounts starting at `start` (inclusive), ascending.
    pub fn range(
        &self,
        _txn: &dyn Transaction,
        start: Account,
        max: usize,
    ) -> Vec<(Account, AccountInfo)> {
        self.inner
            .read()
            .unwrap()
            .range(start..)
            .take(max)
            .map(|(account, info)| (*account, info.clone()))
            .collect()
    }

    pub fn count(&self, _txn: &dyn Transaction) -> usize {
        self.inner.read().unwrap().len()
    }
}
