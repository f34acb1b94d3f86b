//! Millisecond timestamp used throughout the protocol.
//!
//! Timestamps are Unix epoch milliseconds (UTC). On the wire they occupy a
//! fixed 6 bytes, which bounds them to `2^48 - 1` ms (year 10889).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    /// Largest value representable in the 6-byte wire encoding.
    pub const MAX_WIRE: u64 = (1 << 48) - 1;

    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Get the current system time as a `Timestamp`.
    ///
    /// A clock set before the Unix epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Milliseconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    pub fn plus_millis(&self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Encode into the fixed 6-byte big-endian wire form.
    pub fn to_wire(&self) -> [u8; 6] {
        let be = (self.0 & Self::MAX_WIRE).to_be_bytes();
        let mut out = [0u8; 6];
        out.copy_from_slice(&be[2..]);
        out
    }

    pub fn from_wire(bytes: [u8; 6]) -> Self {
        let mut be = [0u8; 8];
        be[2..].copy_from_slice(&bytes);
        Self(u64::from_be_bytes(be))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
