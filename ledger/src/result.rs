//! Result taxonomy of ledger validation.

use std::fmt;

/// Outcome of processing one block against the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockStatus {
    /// Block was applied to the ledger.
    Progress,
    /// The `previous` block is unknown.
    GapPrevious,
    /// The linked source block is unknown.
    GapSource,
    /// Epoch open needs pending entries that are not yet known.
    GapEpochOpenPending,
    /// Block is already in the ledger.
    Old,
    BadSignature,
    /// Send that would increase the sender's balance.
    NegativeSpend,
    /// Receive without a matching pending entry.
    Unreceivable,
    /// A different block already occupies this chain position.
    Fork,
    /// Open block for the burn account.
    OpenedBurnAccount,
    BalanceMismatch,
    RepresentativeMismatch,
    /// Block cannot follow its predecessor.
    BlockPosition,
    InsufficientWork,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockStatus::Progress => "progress",
            BlockStatus::GapPrevious => "gap_previous",
            BlockStatus::GapSource => "gap_source",
            BlockStatus::GapEpochOpenPending => "gap_epoch_open_pending",
            BlockStatus::Old => "old",
            BlockStatus::BadSignature => "bad_signature",
            BlockStatus::NegativeSpend => "negative_spend",
            BlockStatus::Unreceivable => "unreceivable",
            BlockStatus::Fork => "fork",
            BlockStatus::OpenedBurnAccount => "opened_burn_account",
            BlockStatus::BalanceMismatch => "balance_mismatch",
            BlockStatus::RepresentativeMismatch => "representative_mismatch",
            BlockStatus::BlockPosition => "block_position",
            BlockStatus::InsufficientWork => "insufficient_work",
        };
        write!(f, "{name}")
    }
}
