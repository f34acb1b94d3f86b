//! SHA-256 hashing for messages and chained serial hashes.

use quorum_types::Hash;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of arbitrary data.
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash::new(hasher.finalize().into())
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn sha256_multi(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash::new(hasher.finalize().into())
}

/// Link `next` onto `previous`: `sha256(previous ‖ next)`.
///
/// Used for ack and full-fault serial hashes.
pub fn chain_hash(previous: &Hash, next: &Hash) -> Hash {
    sha256_multi(&[previous.as_bytes(), next.as_bytes()])
}
