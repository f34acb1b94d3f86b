//! Network identifier.

use serde::{Deserialize, Serialize};

/// Identifies which network a node participates in.
///
/// Each network is tagged on the wire by a 4-byte magic number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network. Directory block checkpoints apply here only.
    Main,
    /// The public test network.
    Test,
    /// Local development network.
    Local,
    /// A private network identified by its own magic number.
    Custom(u32),
}

impl NetworkId {
    pub fn magic(&self) -> u32 {
        match self {
            Self::Main => 0xFA92_E5A2,
            Self::Test => 0xFA92_E5A3,
            Self::Local => 0xFA92_E5A4,
            Self::Custom(m) => *m,
        }
    }

    pub fn from_magic(magic: u32) -> Self {
        match magic {
            0xFA92_E5A2 => Self::Main,
            0xFA92_E5A3 => Self::Test,
            0xFA92_E5A4 => Self::Local,
            other => Self::Custom(other),
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Local => "local",
            Self::Custom(_) => "custom",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Main)
    }
}
