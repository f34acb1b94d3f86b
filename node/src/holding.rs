//! Holding queue: messages that could not be decided yet.
//!
//! Most held messages are re-validated on every review. Commits waiting
//! for entry credits are parked by their entry-credit key instead and only
//! come back when that balance may have changed.

use std::collections::{HashMap, VecDeque};

use quorum_messages::Message;
use quorum_types::{Hash, PublicKey};

/// Bounded store of undecided messages.
pub struct HoldingQueue {
    held: HashMap<Hash, Message>,
    order: VecDeque<Hash>,
    /// Commits waiting on a balance, by entry-credit key.
    by_credit: HashMap<PublicKey, Vec<Message>>,
    credit_count: usize,
    max_size: usize,
}

impl HoldingQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            held: HashMap::new(),
            order: VecDeque::new(),
            by_credit: HashMap::new(),
            credit_count: 0,
            max_size,
        }
    }

    /// Hold `msg` for the next review.
    ///
    /// Returns `false` if it is already held or the queue is full.
    pub fn insert(&mut self, msg: Message) -> bool {
        if self.len() >= self.max_size {
            return false;
        }
        let hash = msg.msg_hash();
        if self.held.contains_key(&hash) {
            return false;
        }
        self.order.push_back(hash);
        self.held.insert(hash, msg);
        true
    }

    /// Park a commit until `ec_key` is funded.
    pub fn hold_for_credit(&mut self, ec_key: PublicKey, msg: Message) -> bool {
        if self.len() >= self.max_size {
            return false;
        }
        self.by_credit.entry(ec_key).or_default().push(msg);
        self.credit_count += 1;
        true
    }

    /// Commits parked on `ec_key`.
    pub fn release_credit(&mut self, ec_key: &PublicKey) -> Vec<Message> {
        let released = self.by_credit.remove(ec_key).unwrap_or_default();
        self.credit_count -= released.len();
        released
    }

    /// Every parked commit, for a full balance re-check.
    pub fn release_all_credit(&mut self) -> Vec<Message> {
        self.credit_count = 0;
        self.by_credit.drain().flat_map(|(_, msgs)| msgs).collect()
    }

    /// Take the reviewable messages out, oldest first.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.held.len());
        while let Some(hash) = self.order.pop_front() {
            if let Some(msg) = self.held.remove(&hash) {
                out.push(msg);
            }
        }
        out
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.held.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.held.len() + self.credit_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }
}
