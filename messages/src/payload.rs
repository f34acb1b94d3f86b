//! Per-variant codec and signing capabilities.

use quorum_crypto::{sign_full, verify_full};
use quorum_types::{FullSignature, KeyPair};

use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;

/// Codec implemented by every message variant.
///
/// `write_body`/`read_body` cover everything after the type tag. Each body
/// is self-delimiting, so container messages can decode nested messages and
/// continue with the remainder.
pub trait Payload: Sized {
    const KIND: MessageType;

    fn base(&self) -> &MessageBase;
    fn base_mut(&mut self) -> &mut MessageBase;

    fn write_body(&self, w: &mut Writer);
    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError>;

    fn marshal(&self) -> Vec<u8> {
        let mut w = Writer::tagged(Self::KIND);
        self.write_body(&mut w);
        w.into_bytes()
    }

    /// Decode one message of this kind, returning the unconsumed remainder.
    fn unmarshal(data: &[u8]) -> Result<(Self, &[u8]), MessageError> {
        let mut r = Reader::new(data);
        let tag = r.read_u8()?;
        if tag != Self::KIND.tag() {
            return Err(MessageError::WrongType {
                expected: Self::KIND.tag(),
                found: tag,
            });
        }
        let msg = Self::read_body(&mut r)?;
        Ok((msg, r.rest()))
    }
}

/// Variants carrying a signature over [`Signable::marshal_for_signature`].
pub trait Signable: Payload {
    /// Exactly the bytes covered by the signature. Excludes the signature
    /// itself and every process-local field.
    fn marshal_for_signature(&self) -> Vec<u8>;

    fn signature(&self) -> Option<&FullSignature>;
    fn set_signature(&mut self, sig: FullSignature);

    fn sign(&mut self, keypair: &KeyPair) {
        let sig = sign_full(&self.marshal_for_signature(), keypair);
        self.set_signature(sig);
        let base = self.base_mut();
        base.hashes.clear_signed();
        base.sig_valid = true;
    }

    /// Check the embedded signature against the embedded key.
    ///
    /// Short-circuits once a signature has passed, so hold-queue
    /// re-validation never repeats the cryptography.
    fn verify_signature(&mut self) -> Result<bool, MessageError> {
        if self.base().sig_valid {
            return Ok(true);
        }
        let sig = *self.signature().ok_or(MessageError::MissingSignature)?;
        let ok = verify_full(&self.marshal_for_signature(), &sig);
        if ok {
            self.base_mut().sig_valid = true;
        }
        Ok(ok)
    }
}

/// `[type tag] ‖ fields`, the signature preimage shared by most variants.
pub(crate) fn tagged_preimage(kind: MessageType, write: impl FnOnce(&mut Writer)) -> Vec<u8> {
    let mut w = Writer::tagged(kind);
    write(&mut w);
    w.into_bytes()
}

/// Envelope accessors for variants storing it in a `base` field.
macro_rules! base_accessors {
    () => {
        fn base(&self) -> &$crate::envelope::MessageBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::envelope::MessageBase {
            &mut self.base
        }
    };
}

/// Signature accessors for variants storing it in a `signature` field.
macro_rules! signature_accessors {
    () => {
        fn signature(&self) -> Option<&quorum_types::FullSignature> {
            self.signature.as_ref()
        }

        fn set_signature(&mut self, sig: quorum_types::FullSignature) {
            self.signature = Some(sig);
        }
    };
}

pub(crate) use base_accessors;
pub(crate) use signature_accessors;
