//! Ledger application and rollback.

use std::sync::Arc;

use thiserror::Error;

use lattice_store::{
    AccountInfo, PendingKey, Store, Table, Transaction, WriteTransaction,
};
use lattice_types::{
    Account, Amount, Block, BlockHash, BlockSideband, BlockType, Epoch, QualifiedRoot,
};

use crate::result::BlockStatus;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("block not found: {0}")]
    BlockNotFound(BlockHash),

    #[error("account not found")]
    AccountNotFound,

    #[error("cannot roll back {0}: it or a successor is confirmed")]
    Confirmed(BlockHash),
}

/// The account-chain ledger.
pub struct Ledger {
    store: Arc<Store>,
    /// Account whose funds are unspendable; opening it is rejected.
    burn_account: Account,
}

impl Ledger {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_burn_account(store, Account::ZERO)
    }

    pub fn with_burn_account(store: Arc<Store>, burn_account: Account) -> Self {
        Self {
            store,
            burn_account,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Validate and apply one block. On `Progress` the block is persisted
    /// with its sideband attached and the account record updated.
    pub fn process(&self, txn: &WriteTransaction, block: &mut Block) -> BlockStatus {
        if block.signature.is_zero() {
            return BlockStatus::BadSignature;
        }
        if self.store.block().exists(txn, &block.hash) {
            return BlockStatus::Old;
        }
        if block.previous.is_zero() {
            self.process_open(txn, block)
        } else {
            self.process_chained(txn, block)
        }
    }

    fn process_open(&self, txn: &WriteTransaction, block: &mut Block) -> BlockStatus {
        match block.block_type {
            BlockType::Open | BlockType::State => {}
            // Only first-in-chain types may have a zero previous.
            _ => return BlockStatus::BlockPosition,
        }
        if block.account == self.burn_account {
            return BlockStatus::OpenedBurnAccount;
        }
        if self.store.account().get(txn, &block.account).is_some() {
            return BlockStatus::Fork;
        }

        let source = block.link;
        if source.is_zero() {
            if block.block_type == BlockType::Open {
                return BlockStatus::Unreceivable;
            }
            // Epoch-style state open: permitted only once the account has
            // known pending entries to upgrade ahead of.
            if !self.store.pending().any(txn, &block.account) {
                return BlockStatus::GapEpochOpenPending;
            }
            if !block.balance.is_zero() {
                return BlockStatus::BalanceMismatch;
            }
            self.apply(txn, block, false, Epoch::Epoch1, None);
            return BlockStatus::Progress;
        }

        if !self.store.block().exists(txn, &source) {
            return BlockStatus::GapSource;
        }
        let key = PendingKey {
            account: block.account,
            send_hash: source,
        };
        let Some(amount) = self.store.pending().get(txn, &key) else {
            return BlockStatus::Unreceivable;
        };
        if block.balance != amount {
            return BlockStatus::BalanceMismatch;
        }
        self.apply(txn, block, false, Epoch::Epoch0, Some(key));
        BlockStatus::Progress
    }

    fn process_chained(&self, txn: &WriteTransaction, block: &mut Block) -> BlockStatus {
        let Some(previous) = self.store.block().get(txn, &block.previous) else {
            return BlockStatus::GapPrevious;
        };
        if previous.account != block.account {
            return BlockStatus::BlockPosition;
        }
        let Some(info) = self.store.account().get(txn, &block.account) else {
            return BlockStatus::GapPrevious;
        };
        if info.head != block.previous {
            // Another block already occupies this chain position.
            return BlockStatus::Fork;
        }

        match block.block_type {
            BlockType::Send => {
                if block.representative != previous.representative {
                    return BlockStatus::RepresentativeMismatch;
                }
                if block.balance > previous.balance {
                    return BlockStatus::NegativeSpend;
                }
                let amount = previous.balance - block.balance;
                let receiver = Account::new(*block.destination.as_bytes());
                self.apply(txn, block, true, Epoch::Epoch0, None);
                self.store.pending().put(
                    txn,
                    &PendingKey {
                        account: receiver,
                        send_hash: block.hash,
                    },
                    amount,
                );
                BlockStatus::Progress
            }
            BlockType::Receive => {
                if block.representative != previous.representative {
                    return BlockStatus::RepresentativeMismatch;
                }
                self.process_receive(txn, block, &previous)
            }
            BlockType::Change => {
                if block.balance != previous.balance {
                    return BlockStatus::BalanceMismatch;
                }
                self.apply(txn, block, false, Epoch::Epoch0, None);
                BlockStatus::Progress
            }
            BlockType::State => {
                if block.balance < previous.balance {
                    let amount = previous.balance - block.balance;
                    let receiver = Account::new(*block.link.as_bytes());
                    self.apply(txn, block, true, previous.epoch(), None);
                    self.store.pending().put(
                        txn,
                        &PendingKey {
                            account: receiver,
                            send_hash: block.hash,
                        },
                        amount,
                    );
                    BlockStatus::Progress
                } else if block.balance > previous.balance || !block.link.is_zero() {
                    self.process_receive(txn, block, &previous)
                } else {
                    // Representative change only.
                    self.apply(txn, block, false, previous.epoch(), None);
                    BlockStatus::Progress
                }
            }
            BlockType::Open => BlockStatus::BlockPosition,
        }
    }

    fn process_receive(
        &self,
        txn: &WriteTransaction,
        block: &mut Block,
        previous: &Block,
    ) -> BlockStatus {
        let source = block.link;
        if source.is_zero() {
            return BlockStatus::Unreceivable;
        }
        if !self.store.block().exists(txn, &source) {
            return BlockStatus::GapSource;
        }
        let key = PendingKey {
            account: block.account,
            send_hash: source,
        };
        let Some(amount) = self.store.pending().get(txn, &key) else {
            return BlockStatus::Unreceivable;
        };
        if block.balance != previous.balance + amount {
            return BlockStatus::BalanceMismatch;
        }
        self.apply(txn, block, false, previous.epoch(), Some(key));
        BlockStatus::Progress
    }

    /// Persist the block, stamp its sideband, and update the account record.
    fn apply(
        &self,
        txn: &WriteTransaction,
        block: &mut Block,
        is_send: bool,
        epoch: Epoch,
        consumed_pending: Option<PendingKey>,
    ) {
        block.sideband = Some(BlockSideband { is_send, epoch });
        self.store.block().put(txn, block);
        if let Some(key) = consumed_pending {
            self.store.pending().del(txn, &key);
        }

        let previous_info = self.store.account().get(txn, &block.account);
        let confirmed_frontier = previous_info
            .as_ref()
            .map(|info| info.confirmed_frontier)
            .unwrap_or(BlockHash::ZERO);
        let block_count = previous_info.map(|info| info.block_count).unwrap_or(0) + 1;
        self.store.account().put(
            txn,
            &block.account,
            &AccountInfo {
                head: block.hash,
                confirmed_frontier,
                representative: block.representative,
                balance: block.balance,
                block_count,
            },
        );
    }

    /// The block currently occupying the chain position identified by `root`.
    pub fn successor(&self, txn: &dyn Transaction, root: &QualifiedRoot) -> Option<Block> {
        let hash = self.store.block().successor(txn, root)?;
        self.store.block().get(txn, &hash)
    }

    /// The source block a receive depends on; zero for non-receive blocks.
    pub fn block_source(&self, _txn: &dyn Transaction, block: &Block) -> BlockHash {
        match block.block_type {
            BlockType::Receive | BlockType::Open => block.link,
            BlockType::State if !block.is_send() => block.link,
            _ => BlockHash::ZERO,
        }
    }

    pub fn block_exists(&self, txn: &dyn Transaction, hash: &BlockHash) -> bool {
        self.store.block().exists(txn, hash)
    }

    pub fn block_confirmed(&self, txn: &dyn Transaction, hash: &BlockHash) -> bool {
        self.store.block().is_confirmed(txn, hash)
    }

    /// Mark a block confirmed and advance its account's confirmed frontier.
    pub fn confirm(&self, txn: &WriteTransaction, hash: &BlockHash) -> Result<(), LedgerError> {
        let block = self
            .store
            .block()
            .get(txn, hash)
            .ok_or(LedgerError::BlockNotFound(*hash))?;
        self.store.block().set_confirmed(txn, hash);
        if let Some(mut info) = self.store.account().get(txn, &block.account) {
            info.confirmed_frontier = *hash;
            self.store.account().put(txn, &block.account, &info);
        }
        Ok(())
    }

    /// Roll back `hash` and everything above it on its account chain.
    ///
    /// Returns the rolled-back blocks head-first (target last). Fails
    /// without side effects if any block in that span is confirmed.
    pub fn rollback(
        &self,
        txn: &WriteTransaction,
        hash: &BlockHash,
    ) -> Result<Vec<Block>, LedgerError> {
        let target = self
            .store
            .block()
            .get(txn, hash)
            .ok_or(LedgerError::BlockNotFound(*hash))?;
        let info = self
            .store
            .account()
            .get(txn, &target.account)
            .ok_or(LedgerError::AccountNotFound)?;

        // Collect head-first down to (and including) the target.
        let mut chain = Vec::new();
        let mut current = info.head;
        loop {
            let block = self
                .store
                .block()
                .get(txn, &current)
                .ok_or(LedgerError::BlockNotFound(current))?;
            if self.store.block().is_confirmed(txn, &block.hash) {
                return Err(LedgerError::Confirmed(block.hash));
            }
            let previous = block.previous;
            let found = block.hash == *hash;
            chain.push(block);
            if found {
                break;
            }
            if previous.is_zero() {
                return Err(LedgerError::BlockNotFound(*hash));
            }
            current = previous;
        }

        for block in &chain {
            self.undo(txn, block)?;
        }

        tracing::debug!(count = chain.len(), target = %hash, "rolled back chain segment");
        Ok(chain)
    }

    fn undo(&self, txn: &WriteTransaction, block: &Block) -> Result<(), LedgerError> {
        // Reverse the pending side effects.
        if block.is_send() {
            let receiver = if block.destination.is_zero() {
                Account::new(*block.link.as_bytes())
            } else {
                block.destination
            };
            self.store.pending().del(
                txn,
                &PendingKey {
                    account: receiver,
                    send_hash: block.hash,
                },
            );
        } else {
            let source = self.block_source(txn, block);
            if !source.is_zero() {
                let amount = self.receive_amount(txn, block);
                self.store.pending().put(
                    txn,
                    &PendingKey {
                        account: block.account,
                        send_hash: source,
                    },
                    amount,
                );
            }
        }

        self.store.block().del(txn, &block.hash);

        if block.previous.is_zero() {
            self.store.account().del(txn, &block.account);
        } else {
            let previous = self
                .store
                .block()
                .get(txn, &block.previous)
                .ok_or(LedgerError::BlockNotFound(block.previous))?;
            let mut info = self
                .store
                .account()
                .get(txn, &block.account)
                .ok_or(LedgerError::AccountNotFound)?;
            info.head = previous.hash;
            info.balance = previous.balance;
            info.representative = previous.representative;
            info.block_count = info.block_count.saturating_sub(1);
            self.store.account().put(txn, &block.account, &info);
        }
        Ok(())
    }

    fn receive_amount(&self, txn: &dyn Transaction, block: &Block) -> Amount {
        let previous_balance = if block.previous.is_zero() {
            Amount::ZERO
        } else {
            self.store
                .block()
                .get(txn, &block.previous)
                .map(|previous| previous.balance)
                .unwrap_or(Amount::ZERO)
        };
        block.balance.saturating_sub(previous_balance)
    }
}

/// Tables a block-processing write transaction must cover.
pub fn write_tables() -> [Table; 4] {
    [Table::Accounts, Table::Blocks, Table::Frontiers, Table::Pending]
}
