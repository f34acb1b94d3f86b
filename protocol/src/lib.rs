//! Wire protocol: framing of encoded messages and version negotiation.

pub mod error;
pub mod frame;
pub mod version;

pub use error::ProtocolError;
pub use frame::{
    decode_frame, encode_frame, read_frame, write_frame, FrameHeader, HEADER_LEN, MAX_FRAME_SIZE,
};
pub use version::{is_compatible, PROTOCOL_VERSION};
