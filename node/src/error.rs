use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] lattice_ledger::LedgerError),

    #[error("store error: {0}")]
    Store(#[from] lattice_store::StoreError),

    #[error("consensus error: {0}")]
    Consensus(#[from] lattice_consensus::ConsensusError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
