//! Entry-credit commitments for new chains and new entries.
//!
//! A commit pays for a later [`RevealEntry`](crate::RevealEntry). The commit
//! records are fixed-size and carry their own signature by the paying
//! entry-credit key, which covers every byte before that key.

use serde::Serialize;
use std::fmt;

use quorum_crypto::{sha256, sign_message, verify_signature};
use quorum_types::{Hash, KeyPair, PublicKey, Signature, Timestamp};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, Payload};

pub const CHAIN_COMMIT_LEN: usize = 200;
pub const ENTRY_COMMIT_LEN: usize = 136;

/// Credits a new chain costs: 10 for the chain plus 1 to 10 for its first entry.
pub const CHAIN_CREDITS: std::ops::RangeInclusive<u8> = 11..=20;
/// One credit per KiB of entry, up to 10 KiB.
pub const ENTRY_CREDITS: std::ops::RangeInclusive<u8> = 1..=10;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChainCommit {
    pub version: u8,
    pub timestamp: Timestamp,
    pub chain_id_hash: Hash,
    /// Binds the chain id to its first entry.
    pub weld: Hash,
    pub entry_hash: Hash,
    pub credits: u8,
    pub ec_pub_key: PublicKey,
    pub sig: Option<Signature>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntryCommit {
    pub version: u8,
    pub timestamp: Timestamp,
    pub entry_hash: Hash,
    pub credits: u8,
    pub ec_pub_key: PublicKey,
    pub sig: Option<Signature>,
}

impl ChainCommit {
    fn signed_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.push_u8(self.version);
        w.push_timestamp(self.timestamp);
        w.push_hash(&self.chain_id_hash);
        w.push_hash(&self.weld);
        w.push_hash(&self.entry_hash);
        w.push_u8(self.credits);
        w.into_bytes()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.signed_bytes();
        out.extend_from_slice(self.ec_pub_key.as_bytes());
        out.extend_from_slice(&self.sig.map(|s| s.0).unwrap_or([0u8; 64]));
        out
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            version: r.read_u8()?,
            timestamp: r.read_timestamp()?,
            chain_id_hash: r.read_hash()?,
            weld: r.read_hash()?,
            entry_hash: r.read_hash()?,
            credits: r.read_u8()?,
            ec_pub_key: PublicKey(r.read_array()?),
            sig: read_optional_sig(r)?,
        })
    }

    pub fn hash(&self) -> Hash {
        sha256(&self.to_bytes())
    }

    pub fn sign(&mut self, keypair: &KeyPair) {
        self.ec_pub_key = keypair.public;
        self.sig = Some(sign_message(&self.signed_bytes(), &keypair.private));
    }

    pub fn verify(&self) -> bool {
        match &self.sig {
            Some(sig) => verify_signature(&self.signed_bytes(), sig, &self.ec_pub_key),
            None => false,
        }
    }

    pub fn credits_in_range(&self) -> bool {
        CHAIN_CREDITS.contains(&self.credits)
    }
}

impl EntryCommit {
    fn signed_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.push_u8(self.version);
        w.push_timestamp(self.timestamp);
        w.push_hash(&self.entry_hash);
        w.push_u8(self.credits);
        w.into_bytes()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.signed_bytes();
        out.extend_from_slice(self.ec_pub_key.as_bytes());
        out.extend_from_slice(&self.sig.map(|s| s.0).unwrap_or([0u8; 64]));
        out
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            version: r.read_u8()?,
            timestamp: r.read_timestamp()?,
            entry_hash: r.read_hash()?,
            credits: r.read_u8()?,
            ec_pub_key: PublicKey(r.read_array()?),
            sig: read_optional_sig(r)?,
        })
    }

    pub fn hash(&self) -> Hash {
        sha256(&self.to_bytes())
    }

    pub fn sign(&mut self, keypair: &KeyPair) {
        self.ec_pub_key = keypair.public;
        self.sig = Some(sign_message(&self.signed_bytes(), &keypair.private));
    }

    pub fn verify(&self) -> bool {
        match &self.sig {
            Some(sig) => verify_signature(&self.signed_bytes(), sig, &self.ec_pub_key),
            None => false,
        }
    }

    pub fn credits_in_range(&self) -> bool {
        ENTRY_CREDITS.contains(&self.credits)
    }
}

// An all-zero signature on the wire means "unsigned".
fn read_optional_sig(r: &mut Reader<'_>) -> Result<Option<Signature>, MessageError> {
    let raw: [u8; 64] = r.read_array()?;
    Ok((raw != [0u8; 64]).then_some(Signature(raw)))
}

/// Message carrying a [`ChainCommit`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct CommitChain {
    #[serde(flatten)]
    pub base: MessageBase,
    pub commit: ChainCommit,
}

/// Message carrying an [`EntryCommit`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct CommitEntry {
    #[serde(flatten)]
    pub base: MessageBase,
    pub commit: EntryCommit,
}

impl CommitChain {
    pub fn new(commit: ChainCommit) -> Self {
        Self {
            base: MessageBase::new(),
            commit,
        }
    }
}

impl CommitEntry {
    pub fn new(commit: EntryCommit) -> Self {
        Self {
            base: MessageBase::new(),
            commit,
        }
    }
}

impl Payload for CommitChain {
    const KIND: MessageType = MessageType::CommitChain;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_raw(&self.commit.to_bytes());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self::new(ChainCommit::read(r)?))
    }
}

impl Payload for CommitEntry {
    const KIND: MessageType = MessageType::CommitEntry;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        w.push_raw(&self.commit.to_bytes());
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self::new(EntryCommit::read(r)?))
    }
}

impl fmt::Display for CommitChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommitChain chain={} entry={} credits={}",
            &self.commit.chain_id_hash.to_hex()[..8],
            &self.commit.entry_hash.to_hex()[..8],
            self.commit.credits
        )
    }
}

impl fmt::Display for CommitEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommitEntry entry={} credits={}",
            &self.commit.entry_hash.to_hex()[..8],
            self.commit.credits
        )
    }
}
