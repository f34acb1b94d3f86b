//! Per-message metadata carried by every variant.
//!
//! Most of the envelope never touches the wire: origin hints, resend and
//! expiry bookkeeping, validation flags and hash caches are process-local.
//! Only `vm_index`, `minute` and `leader_chain_id` are serialized, and only
//! by the variants whose layout includes them.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use quorum_types::{Hash, Timestamp};

/// Write-once hash caches.
///
/// Each slot is computed on first access and never recomputed. Signing a
/// message clears the slots whose input covers the signature.
#[derive(Clone, Debug, Default)]
pub struct HashCache {
    hash: OnceLock<Hash>,
    msg: OnceLock<Hash>,
    repeat: OnceLock<Hash>,
}

impl HashCache {
    pub fn hash_or_init(&self, compute: impl FnOnce() -> Hash) -> Hash {
        *self.hash.get_or_init(compute)
    }

    pub fn msg_or_init(&self, compute: impl FnOnce() -> Hash) -> Hash {
        *self.msg.get_or_init(compute)
    }

    pub fn repeat_or_init(&self, compute: impl FnOnce() -> Hash) -> Hash {
        *self.repeat.get_or_init(compute)
    }

    /// Drop the slot covering the signature bytes.
    pub fn clear_signed(&mut self) {
        self.repeat.take();
    }

    pub fn clear_all(&mut self) {
        self.hash.take();
        self.msg.take();
        self.repeat.take();
    }
}

/// Common envelope embedded in every message variant.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MessageBase {
    /// Local peer index the message arrived from; 0 means generated locally.
    #[serde(skip)]
    pub origin: usize,
    /// Peer address the message arrived from.
    #[serde(skip)]
    pub network_origin: String,
    /// Reply to the origin peer only instead of broadcasting.
    pub peer2peer: bool,
    /// Never leaves this node.
    pub local_only: bool,
    /// Suppress automatic retries in the reliability layer.
    #[serde(skip)]
    pub no_resend: bool,
    /// Shared between clones so retry tasks observe an in-flight resend.
    #[serde(skip)]
    resend_cnt: Arc<AtomicU32>,
    pub leader_chain_id: Hash,
    pub vm_index: u8,
    #[serde(skip)]
    pub vm_hash: Option<Hash>,
    pub minute: u8,
    #[serde(skip)]
    placed: bool,
    /// When the reliability layer last resent this message.
    #[serde(skip)]
    pub resend_at: Option<Timestamp>,
    /// When the holding queue first saw this message.
    #[serde(skip)]
    pub first_held_at: Option<Timestamp>,
    #[serde(skip)]
    pub stalled: bool,
    #[serde(skip)]
    pub invalid: bool,
    /// Signature already verified; skip re-verification.
    #[serde(skip)]
    pub sig_valid: bool,
    /// Every signature the message carries has been checked, including
    /// witness lists.
    #[serde(skip)]
    pub already_validated: bool,
    #[serde(skip)]
    pub hashes: HashCache,
}

impl MessageBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resend_count(&self) -> u32 {
        self.resend_cnt.load(Ordering::SeqCst)
    }

    /// Increment the resend counter, returning the previous value.
    pub fn bump_resend(&self) -> u32 {
        self.resend_cnt.fetch_add(1, Ordering::SeqCst)
    }

    /// Assign the VM lane and minute. The first assignment wins; later calls
    /// are ignored and return `false`.
    pub fn place(&mut self, vm_index: u8, minute: u8) -> bool {
        if self.placed {
            return false;
        }
        self.vm_index = vm_index;
        self.minute = minute;
        self.placed = true;
        true
    }

    pub fn is_placed(&self) -> bool {
        self.placed
    }

    /// Copy routing hints from the message being answered.
    pub fn reply_to(&mut self, request: &MessageBase) {
        self.origin = request.origin;
        self.network_origin = request.network_origin.clone();
        self.peer2peer = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_is_write_once() {
        let mut base = MessageBase::new();
        assert!(base.place(3, 7));
        assert!(!base.place(1, 2));
        assert_eq!((base.vm_index, base.minute), (3, 7));
        assert!(base.is_placed());
    }

    #[test]
    fn resend_counter_is_shared_between_clones() {
        let base = MessageBase::new();
        let clone = base.clone();
        assert_eq!(base.bump_resend(), 0);
        assert_eq!(clone.resend_count(), 1);
    }

    #[test]
    fn hash_cache_computes_once() {
        let cache = HashCache::default();
        let first = cache.msg_or_init(|| Hash::new([1; 32]));
        let second = cache.msg_or_init(|| Hash::new([2; 32]));
        assert_eq!(first, second);
    }

    #[test]
    fn clear_signed_only_drops_repeat() {
        let mut cache = HashCache::default();
        cache.msg_or_init(|| Hash::new([1; 32]));
        cache.repeat_or_init(|| Hash::new([1; 32]));
        cache.clear_signed();
        assert_eq!(cache.msg_or_init(|| Hash::new([9; 32])), Hash::new([1; 32]));
        assert_eq!(
            cache.repeat_or_init(|| Hash::new([9; 32])),
            Hash::new([9; 32])
        );
    }

    #[test]
    fn reply_to_copies_routing() {
        let mut request = MessageBase::new();
        request.origin = 4;
        request.network_origin = "10.0.0.4:8108".into();
        let mut reply = MessageBase::new();
        reply.reply_to(&request);
        assert_eq!(reply.origin, 4);
        assert!(reply.peer2peer);
    }
}
