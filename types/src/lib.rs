//! Fundamental types for the Lattice protocol.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: block hashes, accounts, amounts, blocks with their sidebands,
//! and key/signature material.

pub mod account;
pub mod amount;
pub mod block;
pub mod hash;
pub mod keys;

pub use account::Account;
pub use amount::Amount;
pub use block::{Block, BlockSideband, BlockType, Epoch, QualifiedRoot};
pub use hash::{BlockHash, HashOrAccount};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
