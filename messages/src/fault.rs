//! Leader fault claims.
//!
//! A [`ServerFault`] is one witness's signed claim that the leader of a VM
//! has stopped making progress. A [`FullServerFault`] carries the identical
//! [`FaultCore`] plus enough witness signatures to act on it. Witnesses sign
//! the core bytes alone, so their signatures move unchanged from the
//! individual claims into the full fault's signature list.

use serde::Serialize;
use std::fmt;

use quorum_crypto::{chain_hash, sha256};
use quorum_types::{FullSignature, Hash, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, signature_accessors, tagged_preimage, Payload, Signable};

/// Fields shared bit-for-bit by [`ServerFault`] and [`FullServerFault`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FaultCore {
    /// The leader being faulted.
    pub server_id: Hash,
    /// The audit server nominated to replace it.
    pub audit_server_id: Hash,
    pub vm_index: u8,
    pub db_height: u32,
    pub height: u32,
    /// Orders faults across VMs.
    pub system_height: u32,
    pub timestamp: Timestamp,
}

impl FaultCore {
    pub const WIRE_LEN: usize = 32 + 32 + 1 + 4 + 4 + 4 + 6;

    fn write(&self, w: &mut Writer) {
        w.push_hash(&self.server_id);
        w.push_hash(&self.audit_server_id);
        w.push_u8(self.vm_index);
        w.push_u32(self.db_height);
        w.push_u32(self.height);
        w.push_u32(self.system_height);
        w.push_timestamp(self.timestamp);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            server_id: r.read_hash()?,
            audit_server_id: r.read_hash()?,
            vm_index: r.read_u8()?,
            db_height: r.read_u32()?,
            height: r.read_u32()?,
            system_height: r.read_u32()?,
            timestamp: r.read_timestamp()?,
        })
    }

    /// The bytes every witness signs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write(&mut w);
        w.into_bytes()
    }

    pub fn hash(&self) -> Hash {
        sha256(&self.to_bytes())
    }

    /// Placeholder faults name nobody and are never processed.
    pub fn is_nil(&self) -> bool {
        self.server_id.is_zero() || self.audit_server_id.is_zero()
    }
}

/// One witness's claim.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ServerFault {
    #[serde(flatten)]
    pub base: MessageBase,
    pub core: FaultCore,
    pub signature: Option<FullSignature>,
}

impl ServerFault {
    pub fn new(core: FaultCore) -> Self {
        let mut base = MessageBase::new();
        base.place(core.vm_index, 0);
        Self {
            base,
            core,
            signature: None,
        }
    }

    pub fn core_hash(&self) -> Hash {
        self.core.hash()
    }
}

impl Payload for ServerFault {
    const KIND: MessageType = MessageType::ServerFault;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.core.write(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let mut msg = Self::new(FaultCore::read(r)?);
        msg.signature = r.read_signature_block()?;
        Ok(msg)
    }
}

impl Signable for ServerFault {
    fn marshal_for_signature(&self) -> Vec<u8> {
        self.core.to_bytes()
    }

    signature_accessors!();
}

/// A fault claim backed by a list of witness signatures.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FullServerFault {
    #[serde(flatten)]
    pub base: MessageBase,
    pub core: FaultCore,
    /// Links this fault to the previous full fault of the same lineage.
    pub serial_hash: Hash,
    /// Witness signatures over the core bytes.
    pub signature_list: Vec<FullSignature>,
    /// The assembling negotiator's signature.
    pub signature: Option<FullSignature>,
}

impl FullServerFault {
    /// Build from a core, chaining onto `previous` when one exists.
    pub fn new(core: FaultCore, previous: Option<&Hash>, signature_list: Vec<FullSignature>) -> Self {
        let core_hash = core.hash();
        let serial_hash = match previous {
            Some(prev) => chain_hash(prev, &core_hash),
            None => core_hash,
        };
        let mut base = MessageBase::new();
        base.place(core.vm_index, 0);
        Self {
            base,
            core,
            serial_hash,
            signature_list,
            signature: None,
        }
    }

    pub fn core_hash(&self) -> Hash {
        self.core.hash()
    }

    fn write_fields(&self, w: &mut Writer) {
        self.core.write(w);
        w.push_hash(&self.serial_hash);
        w.push_signature_list(&self.signature_list);
    }
}

impl Payload for FullServerFault {
    const KIND: MessageType = MessageType::FullServerFault;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.write_fields(w);
        w.push_signature_block(self.signature.as_ref());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let core = FaultCore::read(r)?;
        let mut base = MessageBase::new();
        base.place(core.vm_index, 0);
        Ok(Self {
            base,
            core,
            serial_hash: r.read_hash()?,
            signature_list: r.read_signature_list()?,
            signature: r.read_signature_block()?,
        })
    }
}

impl Signable for FullServerFault {
    fn marshal_for_signature(&self) -> Vec<u8> {
        tagged_preimage(Self::KIND, |w| self.write_fields(w))
    }

    signature_accessors!();
}

impl fmt::Display for FaultCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vm={} dbht={} ht={} sysht={} fault={} audit={}",
            self.vm_index,
            self.db_height,
            self.height,
            self.system_height,
            &self.server_id.to_hex()[..8],
            &self.audit_server_id.to_hex()[..8]
        )
    }
}

impl fmt::Display for ServerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerFault {}", self.core)
    }
}

impl fmt::Display for FullServerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FullServerFault {} sigs={} serial={}",
            self.core,
            self.signature_list.len(),
            &self.serial_hash.to_hex()[..8]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_crypto::{keypair_from_seed, verify_full};

    fn core() -> FaultCore {
        FaultCore {
            server_id: Hash::new([1; 32]),
            audit_server_id: Hash::new([2; 32]),
            vm_index: 3,
            db_height: 100,
            height: 7,
            system_height: 4,
            timestamp: Timestamp::from_millis(1_650_000_000_123),
        }
    }

    #[test]
    fn core_hash_matches_between_fault_kinds() {
        let sf = ServerFault::new(core());
        let fsf = FullServerFault::new(core(), None, Vec::new());
        assert_eq!(sf.core_hash(), fsf.core_hash());
    }

    #[test]
    fn first_full_fault_serial_is_core_hash() {
        let fsf = FullServerFault::new(core(), None, Vec::new());
        assert_eq!(fsf.serial_hash, fsf.core_hash());
        let next = FullServerFault::new(core(), Some(&fsf.serial_hash), Vec::new());
        assert_eq!(next.serial_hash, chain_hash(&fsf.serial_hash, &fsf.core_hash()));
    }

    #[test]
    fn witness_signature_transfers_to_full_fault() {
        let kp = keypair_from_seed(&[8; 32]);
        let mut sf = ServerFault::new(core());
        sf.sign(&kp);
        let sig = sf.signature.unwrap();
        let fsf = FullServerFault::new(core(), None, vec![sig]);
        assert!(verify_full(&fsf.core.to_bytes(), &fsf.signature_list[0]));
    }

    #[test]
    fn nil_when_either_server_is_zero() {
        assert!(!core().is_nil());
        let mut c = core();
        c.audit_server_id = Hash::ZERO;
        assert!(c.is_nil());
        let mut c = core();
        c.server_id = Hash::ZERO;
        assert!(c.is_nil());
    }

    #[test]
    fn full_fault_roundtrip_keeps_signature_list() {
        let kps: Vec<_> = (0..3u8).map(|i| keypair_from_seed(&[i; 32])).collect();
        let sigs = kps
            .iter()
            .map(|kp| quorum_crypto::sign_full(&core().to_bytes(), kp))
            .collect();
        let fsf = FullServerFault::new(core(), None, sigs);
        let bytes = fsf.marshal();
        let (decoded, rest) = FullServerFault::unmarshal(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.signature_list, fsf.signature_list);
        assert_eq!(decoded.core, core());
        assert_eq!(bytes.len(), 1 + FaultCore::WIRE_LEN + 32 + 4 + 3 * 96 + 1);
    }
}
