//! Fundamental types for the quorum node protocol layer.
//!
//! This crate defines the fixed-size values shared across every other crate in
//! the workspace: hashes, keys, signatures, millisecond timestamps, network
//! identifiers, and the tri-state validation result.

pub mod hash;
pub mod keys;
pub mod network;
pub mod time;
pub mod validity;

pub use hash::Hash;
pub use keys::{FullSignature, KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use time::Timestamp;
pub use validity::Validity;
