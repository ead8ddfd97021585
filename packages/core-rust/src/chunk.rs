//! Chunk versions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A monotonic per-namespace chunk version.
///
/// Zero means "unsharded / cleared". Once a namespace's version is greater
/// than zero it may only increase, except via an explicit authoritative
/// drop back to zero (enforced by the version store, not here).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChunkVersion(pub u64);

impl ChunkVersion {
    /// The "unsharded / cleared" sentinel.
    pub const UNSET: ChunkVersion = ChunkVersion(0);

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ChunkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChunkVersion {
    fn from(v: u64) -> Self {
        ChunkVersion(v)
    }
}
