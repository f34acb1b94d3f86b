//! Diagnostic round-trip pings for measuring network latency.

use serde::Serialize;
use std::fmt;

use quorum_types::Timestamp;

use crate::ack::hex_bytes;
use crate::buffer::{Reader, Writer};
use crate::envelope::MessageBase;
use crate::error::MessageError;
use crate::kind::MessageType;
use crate::payload::{base_accessors, Payload};

/// Longest ping name accepted on decode.
const MAX_NAME_LEN: usize = 64;

/// Shared body of [`Bounce`] and [`BounceReply`]: each hop appends a stamp.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Ping {
    pub name: String,
    pub number: i32,
    pub timestamp: Timestamp,
    pub stamps: Vec<Timestamp>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Ping {
    fn write(&self, w: &mut Writer) {
        w.push_bytes(self.name.as_bytes());
        w.push_i32(self.number);
        w.push_timestamp(self.timestamp);
        w.push_u32(self.stamps.len() as u32);
        for ts in &self.stamps {
            w.push_timestamp(*ts);
        }
        w.push_bytes(&self.data);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        let name = r.read_bytes()?;
        if name.len() > MAX_NAME_LEN {
            return Err(MessageError::Malformed(format!(
                "ping name is {} bytes",
                name.len()
            )));
        }
        let name = String::from_utf8(name)
            .map_err(|_| MessageError::Malformed("ping name is not utf-8".into()))?;
        let number = r.read_i32()?;
        let timestamp = r.read_timestamp()?;
        let count = r.read_count(6)?;
        let mut stamps = Vec::with_capacity(count);
        for _ in 0..count {
            stamps.push(r.read_timestamp()?);
        }
        Ok(Self {
            name,
            number,
            timestamp,
            stamps,
            data: r.read_bytes()?,
        })
    }

    /// Mean milliseconds between successive stamps.
    pub fn mean_hop_millis(&self) -> Option<u64> {
        if self.stamps.len() < 2 {
            return None;
        }
        let total: u64 = self
            .stamps
            .windows(2)
            .map(|w| w[0].elapsed_since(w[1]))
            .sum();
        Some(total / (self.stamps.len() as u64 - 1))
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Bounce {
    #[serde(flatten)]
    pub base: MessageBase,
    pub ping: Ping,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BounceReply {
    #[serde(flatten)]
    pub base: MessageBase,
    pub ping: Ping,
}

impl Bounce {
    pub fn new(ping: Ping) -> Self {
        Self {
            base: MessageBase::new(),
            ping,
        }
    }
}

impl BounceReply {
    /// Answer `bounce`, stamping it with `now`.
    pub fn answer(bounce: &Bounce, now: Timestamp) -> Self {
        let mut ping = bounce.ping.clone();
        ping.stamps.push(now);
        let mut base = MessageBase::new();
        base.reply_to(&bounce.base);
        Self { base, ping }
    }
}

impl Payload for Bounce {
    const KIND: MessageType = MessageType::Bounce;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.ping.write(w);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self::new(Ping::read(r)?))
    }
}

impl Payload for BounceReply {
    const KIND: MessageType = MessageType::BounceReply;

    base_accessors!();

    fn write_body(&self, w: &mut Writer) {
        self.ping.write(w);
    }

    fn read_body(r: &mut Reader<'_>) -> Result<Self, MessageError> {
        Ok(Self {
            base: MessageBase::new(),
            ping: Ping::read(r)?,
        })
    }
}

impl fmt::Display for Bounce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bounce {}-{} hops={}",
            self.ping.name,
            self.ping.number,
            self.ping.stamps.len()
        )
    }
}

impl fmt::Display for BounceReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BounceReply {}-{} hops={}",
            self.ping.name,
            self.ping.number,
            self.ping.stamps.len()
        )
    }
}
