//! Cryptographic operations for the Lattice protocol.
//!
//! Key types live in `lattice_types`; this crate holds the operations:
//! Blake2b hashing, Ed25519 signing, and single/batch verification.

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::blake2b_256;
pub use keys::{generate_keypair, keypair_from_seed};
pub use sign::{sign_message, verify_batch, verify_signature, SignatureChecker};
