//! Cryptographic primitives for the quorum node.
//!
//! - **Ed25519** for signing and verifying protocol messages
//! - **SHA-256** for message hashes, serial-hash chaining and fault core hashes

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{chain_hash, sha256, sha256_multi};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_full, sign_message, verify_full, verify_signature};
