//! Tri-state validation result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of validating a message against the current chain state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Validity {
    /// Provably invalid: discard, never re-queue.
    Invalid,
    /// Cannot be decided with the current state: hold and re-check later.
    Pending,
    /// Valid: admit for execution.
    Valid,
}

impl Validity {
    /// The numeric form used in logs and diagnostics (-1, 0, 1).
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Invalid => -1,
            Self::Pending => 0,
            Self::Valid => 1,
        }
    }

    pub fn from_i8(v: i8) -> Self {
        match v {
            v if v < 0 => Self::Invalid,
            0 => Self::Pending,
            _ => Self::Valid,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}
