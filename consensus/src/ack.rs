//! Ack issuing on the leader side and ack-chain following on the follower
//! side.
//!
//! Within one (block height, VM) lane acks form a hash chain: the first ack's
//! serial hash is the hash of the message it orders, and every later ack's
//! serial hash is `chain_hash(previous serial, message hash)`. A follower
//! accepts acks strictly in height order and rejects any break in the chain.

use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;

use quorum_crypto::chain_hash;
use quorum_messages::{Ack, Message, Signable};
use quorum_types::{Hash, KeyPair, Timestamp};

/// Position and chain head of one lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Lane {
    next_height: u32,
    serial: Option<Hash>,
}

impl Lane {
    fn serial_for(&self, message_hash: &Hash) -> Hash {
        match &self.serial {
            Some(prev) => chain_hash(prev, message_hash),
            None => *message_hash,
        }
    }
}

/// Issues signed acks for the VMs this node leads.
pub struct Leader {
    keypair: KeyPair,
    identity_chain_id: Hash,
    salt: [u8; 32],
    salt_number: u32,
    lanes: HashMap<(u32, u8), Lane>,
}

impl Leader {
    pub fn new(keypair: KeyPair, identity_chain_id: Hash) -> Self {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; 32];
        rng.fill_bytes(&mut salt);
        Self {
            keypair,
            identity_chain_id,
            salt,
            salt_number: rng.next_u32(),
            lanes: HashMap::new(),
        }
    }

    pub fn identity_chain_id(&self) -> Hash {
        self.identity_chain_id
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Next height this leader will assign in a lane.
    pub fn next_height(&self, db_height: u32, vm_index: u8) -> u32 {
        self.lanes
            .get(&(db_height, vm_index))
            .map(|l| l.next_height)
            .unwrap_or(0)
    }

    /// Order `msg` at the next slot of lane (`db_height`, `vm_index`).
    pub fn issue_ack(
        &mut self,
        msg: &Message,
        db_height: u32,
        vm_index: u8,
        minute: u8,
        now: Timestamp,
    ) -> Ack {
        let message_hash = msg.msg_hash();
        let lane = self.lanes.entry((db_height, vm_index)).or_default();
        let serial_hash = lane.serial_for(&message_hash);

        let mut salt = [0u8; 8];
        salt.copy_from_slice(&self.salt[..8]);
        let mut ack = Ack {
            timestamp: now,
            salt,
            salt_number: self.salt_number,
            message_hash,
            db_height,
            height: lane.next_height,
            serial_hash,
            ..Ack::default()
        };
        ack.base.place(vm_index, minute);
        ack.base.leader_chain_id = self.identity_chain_id;
        ack.sign(&self.keypair);

        lane.next_height += 1;
        lane.serial = Some(serial_hash);
        ack
    }

    /// Forget lanes of blocks at or below `saved_height`.
    pub fn prune(&mut self, saved_height: u32) {
        self.lanes.retain(|(dbht, _), _| *dbht > saved_height);
    }
}

/// Where an inbound ack falls relative to its lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AckOrder {
    /// Next in sequence with an intact chain.
    Ordered,
    /// Beyond the next expected height; hold until the gap fills.
    Ahead,
    /// At a height already accepted.
    Stale,
    /// Next in sequence but its serial hash does not extend the chain.
    Broken,
}

/// Follower-side ack chains, one per lane.
#[derive(Default)]
pub struct AckChain {
    lanes: HashMap<(u32, u8), Lane>,
}

impl AckChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_height(&self, db_height: u32, vm_index: u8) -> u32 {
        self.lanes
            .get(&(db_height, vm_index))
            .map(|l| l.next_height)
            .unwrap_or(0)
    }

    pub fn classify(&self, ack: &Ack) -> AckOrder {
        let lane = self
            .lanes
            .get(&(ack.db_height, ack.base.vm_index))
            .copied()
            .unwrap_or_default();
        if ack.height < lane.next_height {
            AckOrder::Stale
        } else if ack.height > lane.next_height {
            AckOrder::Ahead
        } else if lane.serial_for(&ack.message_hash) != ack.serial_hash {
            AckOrder::Broken
        } else {
            AckOrder::Ordered
        }
    }

    /// Classify and, when ordered, advance the lane.
    pub fn accept(&mut self, ack: &Ack) -> AckOrder {
        let order = self.classify(ack);
        if order == AckOrder::Ordered {
            let lane = self
                .lanes
                .entry((ack.db_height, ack.base.vm_index))
                .or_default();
            lane.next_height += 1;
            lane.serial = Some(ack.serial_hash);
        }
        order
    }

    pub fn prune(&mut self, saved_height: u32) {
        self.lanes.retain(|(dbht, _), _| *dbht > saved_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_crypto::keypair_from_seed;
    use quorum_messages::{Eom, MissingData};

    fn msg(n: u8) -> Message {
        Message::MissingData(MissingData::new(Hash::new([n; 32]), Timestamp::EPOCH))
    }

    fn leader() -> Leader {
        Leader::new(keypair_from_seed(&[1; 32]), Hash::new([9; 32]))
    }

    #[test]
    fn first_ack_serial_is_message_hash() {
        let mut leader = leader();
        let m = msg(1);
        let ack = leader.issue_ack(&m, 10, 0, 0, Timestamp::EPOCH);
        assert_eq!(ack.height, 0);
        assert_eq!(ack.serial_hash, m.msg_hash());
    }

    #[test]
    fn serials_chain_within_a_lane() {
        let mut leader = leader();
        let a = leader.issue_ack(&msg(1), 10, 0, 0, Timestamp::EPOCH);
        let m2 = msg(2);
        let b = leader.issue_ack(&m2, 10, 0, 0, Timestamp::EPOCH);
        assert_eq!(b.height, 1);
        assert_eq!(b.serial_hash, chain_hash(&a.serial_hash, &m2.msg_hash()));
        // Another VM starts its own chain.
        let c = leader.issue_ack(&m2, 10, 1, 0, Timestamp::EPOCH);
        assert_eq!(c.height, 0);
    }

    #[test]
    fn issued_acks_are_signed_with_salt() {
        let mut leader = leader();
        let eom = Message::Eom(Eom::new(Hash::new([9; 32]), 0, 1, 5, Timestamp::EPOCH));
        let mut ack = leader.issue_ack(&eom, 5, 0, 1, Timestamp::EPOCH);
        assert_eq!(ack.verify_signature(), Ok(true));
        assert_eq!(ack.salt[..], leader.salt[..8]);
        assert_eq!(ack.base.leader_chain_id, Hash::new([9; 32]));
    }

    #[test]
    fn follower_accepts_leader_chain_in_order() {
        let mut leader = leader();
        let acks: Vec<_> = (0..4)
            .map(|i| leader.issue_ack(&msg(i), 3, 2, 0, Timestamp::EPOCH))
            .collect();
        let mut chain = AckChain::new();
        assert_eq!(chain.accept(&acks[1]), AckOrder::Ahead);
        for ack in &acks {
            assert_eq!(chain.accept(ack), AckOrder::Ordered);
        }
        assert_eq!(chain.accept(&acks[0]), AckOrder::Stale);
        assert_eq!(chain.next_height(3, 2), 4);
    }

    #[test]
    fn tampered_serial_breaks_chain() {
        let mut leader = leader();
        let first = leader.issue_ack(&msg(1), 3, 0, 0, Timestamp::EPOCH);
        let mut second = leader.issue_ack(&msg(2), 3, 0, 0, Timestamp::EPOCH);
        second.serial_hash = Hash::new([0xEE; 32]);
        let mut chain = AckChain::new();
        assert_eq!(chain.accept(&first), AckOrder::Ordered);
        assert_eq!(chain.accept(&second), AckOrder::Broken);
        assert_eq!(chain.next_height(3, 0), 1);
    }

    #[test]
    fn prune_drops_saved_heights() {
        let mut leader = leader();
        leader.issue_ack(&msg(1), 3, 0, 0, Timestamp::EPOCH);
        leader.prune(3);
        assert_eq!(leader.next_height(3, 0), 0);
    }
}
