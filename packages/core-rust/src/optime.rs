//! Op-log positions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in the op-log: `(seconds, increment)`, totally ordered.
///
/// The increment disambiguates multiple writes committed within the same
/// second. The zero value means "no op-log entry observed yet".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct OpTime {
    pub secs: u32,
    pub inc: u32,
}

impl OpTime {
    #[must_use]
    pub fn new(secs: u32, inc: u32) -> Self {
        Self { secs, inc }
    }

    /// `true` for the zero sentinel ("nothing written yet").
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.secs == 0 && self.inc == 0
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs, self.inc)
    }
}
