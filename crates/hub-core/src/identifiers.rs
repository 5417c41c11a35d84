//! Account identifiers and sequence numbers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier in the social graph
///
/// Zero is reserved and never identifies a registered account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fid(pub u64);

impl Fid {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Whether this fid can name a registered account
    pub const fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl From<u64> for Fid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number assigned by a store when it commits a message
pub type SeqNo = u64;

/// Hex rendering for raw key and address bytes in logs and error text
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
