//! Assignment of messages to virtual machines.

use quorum_messages::Message;
use quorum_types::Hash;

/// Sum of the bytes modulo the federated-server count.
pub fn vm_index_for(bytes: &[u8], fed_count: usize) -> u8 {
    if fed_count == 0 {
        return 0;
    }
    let sum = bytes.iter().fold(0usize, |acc, b| acc.wrapping_add(*b as usize));
    (sum % fed_count) as u8
}

/// Hash that selects the VM for a leader-ordered message.
///
/// Messages about one chain share a lane so their order is preserved.
pub fn selection_hash(msg: &Message) -> Hash {
    match msg {
        Message::CommitChain(m) => m.commit.chain_id_hash,
        Message::CommitEntry(m) => m.commit.entry_hash,
        Message::RevealEntry(m) => m.chain_id,
        Message::AddServer(m) => m.server_chain_id,
        Message::RemoveServer(m) => m.server_chain_id,
        Message::ChangeServerKey(m) => m.identity_chain_id,
        _ => msg.msg_hash(),
    }
}

/// VM a message belongs to with `fed_count` leaders.
///
/// Messages that name their VM on the wire keep it; the rest are hashed
/// into a lane. The selection hash is recorded on the envelope.
pub fn compute_vm_index(msg: &mut Message, fed_count: usize) -> u8 {
    let on_wire = match &*msg {
        Message::Eom(_)
        | Message::Ack(_)
        | Message::DirectoryBlockSignature(_)
        | Message::MissingMsg(_)
        | Message::Negotiation(_) => Some(msg.base().vm_index),
        Message::ServerFault(m) => Some(m.core.vm_index),
        Message::FullServerFault(m) => Some(m.core.vm_index),
        _ => None,
    };
    if let Some(vm) = on_wire {
        return vm;
    }
    let hash = selection_hash(msg);
    msg.base_mut().vm_hash = Some(hash);
    vm_index_for(hash.as_bytes(), fed_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_messages::RevealEntry;
    use quorum_types::Timestamp;

    #[test]
    fn sums_bytes_modulo_leaders() {
        assert_eq!(vm_index_for(&[1, 2, 3], 4), 2);
        assert_eq!(vm_index_for(&[255, 255], 3), (510 % 3) as u8);
        assert_eq!(vm_index_for(&[9], 0), 0);
    }

    #[test]
    fn reveals_on_one_chain_share_a_vm() {
        let chain = Hash::new([7; 32]);
        let mut a = Message::RevealEntry(RevealEntry::new(chain, b"a".to_vec(), Timestamp::EPOCH));
        let mut b = Message::RevealEntry(RevealEntry::new(chain, b"bb".to_vec(), Timestamp::EPOCH));
        assert_eq!(compute_vm_index(&mut a, 5), compute_vm_index(&mut b, 5));
        assert_eq!(a.base().vm_hash, Some(chain));
    }
}
