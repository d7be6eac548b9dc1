//! Pending table: sends awaiting receipt.

use std::collections::HashMap;
use std::sync::RwLock;

use lattice_types::{Account, Amount, BlockHash};

use crate::transaction::{Table, Transaction, WriteTransaction};

/// Key of a pending entry: the receiving account and the send block hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub account: Account,
    pub send_hash: BlockHash,
}

/// Sends that have not yet been received by their destination account.
pub struct PendingTable {
    inner: RwLock<HashMap<PendingKey, Amount>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, _txn: &dyn Transaction, key: &PendingKey) -> Option<Amount> {
        self.inner.read().unwrap().get(key).copied()
    }

    pub fn exists(&self, _txn: &dyn Transaction, key: &PendingKey) -> bool {
        self.inner.read().unwrap().contains_key(key)
    }

    /// Whether the account has any pending entry at all.
    pub fn any(&self, _txn: &dyn Transaction, account: &Account) -> bool {
        self.inner
            .read()
            .unwrap()
            .keys()
            .any(|key| key.account == *account)
    }

    pub fn put(&self, txn: &WriteTransaction, key: &PendingKey, amount: Amount) {
        debug_assert!(txn.covers(Table::Pending));
        self.inner.write().unwrap().insert(*key, amount);
    }

    pub fn del(&self, txn: &WriteTransaction, key: &PendingKey) {
        debug_assert!(txn.covers(Table::Pending));
        self.inner.write().unwrap().remove(key);
    }
}
