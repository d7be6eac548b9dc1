use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("election table is at capacity ({0})")]
    TableFull(usize),

    #[error("no election for hash {0}")]
    ElectionNotFound(lattice_types::BlockHash),

    #[error("vote signature is invalid")]
    InvalidSignature,
}
