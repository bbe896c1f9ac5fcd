use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Zero-based chunk index.
///
/// On the wire and on disk an index is always written in canonical base-10:
/// no sign, no whitespace, no leading zeros. Parsing rejects any other
/// spelling, so `"010"` never aliases chunk 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkIndex(u64);

impl ChunkIndex {
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses a canonical index. Returns `None` for any non-canonical input.
    pub fn parse_canonical(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        if bytes.len() > 1 && bytes[0] == b'0' {
            return None;
        }
        s.parse::<u64>().ok().map(Self)
    }
}

impl From<u64> for ChunkIndex {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChunkIndex {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_canonical(s).ok_or_else(|| ProtocolError::InvalidIndex(s.to_string()))
    }
}

impl TryFrom<String> for ChunkIndex {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChunkIndex> for String {
    fn from(index: ChunkIndex) -> Self {
        index.to_string()
    }
}
