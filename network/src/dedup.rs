//! Rolling set of recently seen repeat hashes.
//!
//! A message re-broadcast by several peers arrives more than once with the
//! same bytes. The repeat hash covers the signature, so two differently
//! signed copies of one payload are still both seen.

use std::collections::HashSet;
use std::collections::VecDeque;

use quorum_messages::Message;
use quorum_types::Hash;

/// Default dedup capacity: track the last 65 536 messages.
pub const DEFAULT_DEDUP_CAPACITY: usize = 65_536;

/// Keeps the last `capacity` repeat hashes in insertion order and evicts
/// the oldest when full.
pub struct MessageDedup {
    capacity: usize,
    hashes: HashSet<Hash>,
    order: VecDeque<Hash>,
}

impl MessageDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            hashes: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns `true` if the hash was seen before; records it otherwise.
    pub fn is_duplicate(&mut self, hash: &Hash) -> bool {
        if self.hashes.contains(hash) {
            return true;
        }
        if self.hashes.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.hashes.remove(&old);
            }
        }
        self.hashes.insert(*hash);
        self.order.push_back(*hash);
        false
    }

    pub fn is_repeat(&mut self, msg: &Message) -> bool {
        self.is_duplicate(&msg.repeat_hash())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl Default for MessageDedup {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
