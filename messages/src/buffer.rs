//! Byte-level primitives shared by every message codec.
//!
//! Integers are big-endian, timestamps occupy 6 bytes, hashes 32 bytes.
//! Variable-length areas are prefixed with a big-endian base-128 var-int.
//! [`Reader`] bounds-checks every access so truncated input becomes
//! [`MessageError::Truncated`] instead of a panic.

use quorum_types::{FullSignature, Hash, PublicKey, Signature, Timestamp};

use crate::error::MessageError;
use crate::kind::MessageType;

/// Longest var-int encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Append-only encoder.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Start a buffer with the message type tag already written.
    pub fn tagged(kind: MessageType) -> Self {
        let mut w = Self::new();
        w.push_u8(kind.tag());
        w
    }

    pub fn push_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn push_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_hash(&mut self, h: &Hash) {
        self.buf.extend_from_slice(h.as_bytes());
    }

    pub fn push_timestamp(&mut self, ts: Timestamp) {
        self.buf.extend_from_slice(&ts.to_wire());
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn push_varint(&mut self, v: u64) {
        let mut groups = [0u8; MAX_VARINT_LEN];
        let mut n = 0;
        let mut x = v;
        loop {
            groups[n] = (x & 0x7f) as u8;
            n += 1;
            x >>= 7;
            if x == 0 {
                break;
            }
        }
        for i in (0..n).rev() {
            let b = if i == 0 { groups[i] } else { groups[i] | 0x80 };
            self.buf.push(b);
        }
    }

    /// Var-int length prefix followed by the bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.push_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// A list of variable-length byte areas: 4-byte count, then each area.
    pub fn push_byte_list(&mut self, items: &[Vec<u8>]) {
        self.push_u32(items.len() as u32);
        for item in items {
            self.push_bytes(item);
        }
    }

    pub fn push_full_signature(&mut self, sig: &FullSignature) {
        self.buf.extend_from_slice(sig.public_key.as_bytes());
        self.buf.extend_from_slice(sig.signature.as_bytes());
    }

    /// Presence byte followed by the signature when present.
    pub fn push_signature_block(&mut self, sig: Option<&FullSignature>) {
        match sig {
            Some(sig) => {
                self.push_u8(1);
                self.push_full_signature(sig);
            }
            None => self.push_u8(0),
        }
    }

    pub fn push_signature_list(&mut self, sigs: &[FullSignature]) {
        self.push_u32(sigs.len() as u32);
        for sig in sigs {
            self.push_full_signature(sig);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked cursor over untrusted input.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unconsumed remainder.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8, MessageError> {
        self.data.get(self.pos).copied().ok_or(MessageError::Truncated {
            needed: 1,
            remaining: 0,
        })
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], MessageError> {
        if n > self.remaining() {
            return Err(MessageError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Advance past `n` bytes that were already parsed elsewhere.
    pub fn skip(&mut self, n: usize) -> Result<(), MessageError> {
        self.take(n).map(|_| ())
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, MessageError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MessageError::Malformed(format!(
                "boolean byte must be 0 or 1, got {other}"
            ))),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, MessageError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, MessageError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash, MessageError> {
        Ok(Hash::new(self.take_array()?))
    }

    pub fn read_timestamp(&mut self) -> Result<Timestamp, MessageError> {
        Ok(Timestamp::from_wire(self.take_array()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        self.take_array()
    }

    pub fn read_varint(&mut self) -> Result<u64, MessageError> {
        let mut v: u64 = 0;
        for _ in 0..MAX_VARINT_LEN {
            let b = self.read_u8()?;
            if v > (u64::MAX >> 7) {
                return Err(MessageError::VarIntOverflow);
            }
            v = (v << 7) | u64::from(b & 0x7f);
            if b & 0x80 == 0 {
                return Ok(v);
            }
        }
        Err(MessageError::VarIntOverflow)
    }

    /// Var-int length-prefixed byte area, bounded by the remaining input.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, MessageError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| MessageError::Truncated {
            needed: usize::MAX,
            remaining: self.remaining(),
        })?;
        Ok(self.take(len)?.to_vec())
    }

    /// A 4-byte element count, rejected up front when the remaining input
    /// cannot possibly hold that many elements of at least `min_size` bytes.
    pub fn read_count(&mut self, min_size: usize) -> Result<usize, MessageError> {
        let count = self.read_u32()? as usize;
        let needed = count.saturating_mul(min_size.max(1));
        if needed > self.remaining() {
            return Err(MessageError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    pub fn read_byte_list(&mut self) -> Result<Vec<Vec<u8>>, MessageError> {
        let count = self.read_count(1)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_bytes()?);
        }
        Ok(out)
    }

    pub fn read_full_signature(&mut self) -> Result<FullSignature, MessageError> {
        let key = PublicKey(self.take_array()?);
        let sig = Signature(self.take_array()?);
        Ok(FullSignature::new(key, sig))
    }

    pub fn read_signature_block(&mut self) -> Result<Option<FullSignature>, MessageError> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.read_full_signature()?)),
            other => Err(MessageError::Malformed(format!(
                "signature presence byte must be 0 or 1, got {other}"
            ))),
        }
    }

    pub fn read_signature_list(&mut self) -> Result<Vec<FullSignature>, MessageError> {
        let count = self.read_count(FullSignature::WIRE_LEN)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_full_signature()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint_bytes(v: u64) -> Vec<u8> {
        let mut w = Writer::new();
        w.push_varint(v);
        w.into_bytes()
    }

    #[test]
    fn varint_small_values_are_one_byte() {
        assert_eq!(varint_bytes(0), vec![0]);
        assert_eq!(varint_bytes(127), vec![127]);
    }

    #[test]
    fn varint_is_big_endian_groups() {
        // 128 = 0b1_0000000 -> [0x81, 0x00]
        assert_eq!(varint_bytes(128), vec![0x81, 0x00]);
        assert_eq!(varint_bytes(300), vec![0x82, 0x2c]);
    }

    #[test]
    fn varint_roundtrip_extremes() {
        for v in [0, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let bytes = varint_bytes(v);
            let mut r = Reader::new(&bytes);
            assert_eq!(r.read_varint().unwrap(), v);
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn varint_overflow_rejected() {
        let bytes = [0xffu8; 11];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_varint(), Err(MessageError::VarIntOverflow));
    }

    #[test]
    fn truncated_read_is_error() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert!(matches!(
            r.read_u32(),
            Err(MessageError::Truncated {
                needed: 4,
                remaining: 3
            })
        ));
    }

    #[test]
    fn oversized_length_prefix_is_error() {
        let mut w = Writer::new();
        w.push_varint(1_000_000);
        w.push_raw(&[0u8; 4]);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(matches!(r.read_bytes(), Err(MessageError::Truncated { .. })));
    }

    #[test]
    fn oversized_count_rejected_before_allocation() {
        let mut w = Writer::new();
        w.push_u32(u32::MAX);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(r.read_signature_list().is_err());
    }

    #[test]
    fn signature_block_presence_byte() {
        let sig = FullSignature::new(PublicKey([1; 32]), Signature([2; 64]));
        let mut w = Writer::new();
        w.push_signature_block(Some(&sig));
        w.push_signature_block(None);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 1 + 96 + 1);
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_signature_block().unwrap(), Some(sig));
        assert_eq!(r.read_signature_block().unwrap(), None);
    }

    #[test]
    fn bad_presence_byte_is_malformed() {
        let mut r = Reader::new(&[7]);
        assert!(matches!(
            r.read_signature_block(),
            Err(MessageError::Malformed(_))
        ));
    }
}
