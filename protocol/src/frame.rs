//! Message framing: `[magic:4][version:2][length:4][message bytes]`.
//!
//! The magic number keeps traffic from different networks apart; the
//! length prefix bounds how much a reader buffers before decoding.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use quorum_messages::Message;
use quorum_types::NetworkId;

use crate::version::{is_compatible, PROTOCOL_VERSION};
use crate::ProtocolError;

/// Maximum encoded message size in bytes.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Bytes before the message body.
pub const HEADER_LEN: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u16,
    pub length: u32,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.magic.to_be_bytes());
        out[4..6].copy_from_slice(&self.version.to_be_bytes());
        out[6..].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            magic: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            version: u16::from_be_bytes([bytes[4], bytes[5]]),
            length: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        }
    }

    /// Reject frames from another network, an unknown version, or too large.
    pub fn check(&self, network: NetworkId) -> Result<usize, ProtocolError> {
        if self.magic != network.magic() {
            return Err(ProtocolError::WrongNetwork {
                expected: network.magic(),
                found: self.magic,
            });
        }
        if !is_compatible(self.version) {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        let size = self.length as usize;
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(size)
    }
}

/// Frame an encoded message for `network`.
pub fn encode_frame(network: NetworkId, message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let body = message.encode();
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let header = FrameHeader {
        magic: network.magic(),
        version: PROTOCOL_VERSION,
        length: body.len() as u32,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode one frame from the front of `data`, returning the message and the
/// number of bytes consumed.
pub fn decode_frame(network: NetworkId, data: &[u8]) -> Result<(Message, usize), ProtocolError> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::Incomplete {
            needed: HEADER_LEN - data.len(),
        });
    }
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&data[..HEADER_LEN]);
    let size = FrameHeader::from_bytes(raw).check(network)?;
    let end = HEADER_LEN + size;
    if data.len() < end {
        return Err(ProtocolError::Incomplete {
            needed: end - data.len(),
        });
    }
    let message = Message::decode(&data[HEADER_LEN..end])?;
    Ok((message, end))
}

/// Read exactly one frame from an async stream.
pub async fn read_frame<R>(reader: &mut R, network: NetworkId) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw).await?;
    let header = FrameHeader::from_bytes(raw);
    let size = header.check(network)?;
    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    let message = Message::decode(&body)?;
    debug!(kind = %message.kind(), size, "frame read");
    Ok(message)
}

pub async fn write_frame<W>(
    writer: &mut W,
    network: NetworkId,
    message: &Message,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(network, message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_messages::{DbStateMissing, MissingData};
    use quorum_types::{Hash, Timestamp};

    fn sample() -> Message {
        Message::DbStateMissing(DbStateMissing::new(10, 20, Timestamp::from_secs(1)))
    }

    #[test]
    fn frame_roundtrip() {
        let frame = encode_frame(NetworkId::Test, &sample()).unwrap();
        let (msg, used) = decode_frame(NetworkId::Test, &frame).unwrap();
        assert_eq!(used, frame.len());
        assert!(msg.is_same_as(&sample()));
    }

    #[test]
    fn other_network_is_rejected() {
        let frame = encode_frame(NetworkId::Main, &sample()).unwrap();
        assert!(matches!(
            decode_frame(NetworkId::Local, &frame),
            Err(ProtocolError::WrongNetwork { .. })
        ));
    }

    #[test]
    fn partial_frame_reports_missing_bytes() {
        let frame = encode_frame(NetworkId::Test, &sample()).unwrap();
        match decode_frame(NetworkId::Test, &frame[..frame.len() - 3]) {
            Err(ProtocolError::Incomplete { needed }) => assert_eq!(needed, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversize_length_is_rejected_before_reading_body() {
        let header = FrameHeader {
            magic: NetworkId::Test.magic(),
            version: PROTOCOL_VERSION,
            length: (MAX_FRAME_SIZE + 1) as u32,
        };
        assert!(matches!(
            decode_frame(NetworkId::Test, &header.to_bytes()),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn async_stream_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let first = sample();
        let second = Message::MissingData(MissingData::new(Hash::new([3; 32]), Timestamp::EPOCH));
        write_frame(&mut a, NetworkId::Local, &first).await.unwrap();
        write_frame(&mut a, NetworkId::Local, &second).await.unwrap();
        let got1 = read_frame(&mut b, NetworkId::Local).await.unwrap();
        let got2 = read_frame(&mut b, NetworkId::Local).await.unwrap();
        assert!(got1.is_same_as(&first));
        assert!(got2.is_same_as(&second));
    }
}
