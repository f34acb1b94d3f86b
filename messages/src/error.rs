use thiserror::Error;

/// Errors produced while encoding, decoding or signing messages.
///
/// Every decode failure on untrusted input surfaces as one of these; the
/// codec never panics on malformed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown message type tag {0}")]
    UnknownType(u8),

    #[error("expected message type {expected}, found {found}")]
    WrongType { expected: u8, found: u8 },

    #[error("var-int exceeds 64 bits")]
    VarIntOverflow,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("message has no signature")]
    MissingSignature,

    #[error("message type {0} is not signable")]
    NotSignable(&'static str),
}
