//! Error taxonomy.
//!
//! Every failure a subsystem reports maps onto one [`ErrorKind`], which
//! fixes its disposition: who hears about it and whether anyone retries.

use drove_core::query::QueryError;

/// The failure classes and their dispositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request or unknown operator. Reported to the client; no
    /// state change.
    BadInput,
    /// The client's chunk version is behind the server's. The reply carries
    /// a flag and the router refreshes.
    StaleConfig,
    /// The node has not been told its configuration server yet; the router
    /// retries with `authoritative=true`.
    NeedAuthoritative,
    /// I/O failure or unreachable peer. Retried at the next poll; surfaces
    /// as "down" in health.
    Transient,
    /// A peer holds a configuration version that conflicts with the
    /// proposal. Initiate/reconfig is rejected.
    ConfigConflict,
    /// Unrecoverable local state. The node stays up for diagnostics but
    /// refuses cluster participation.
    Fatal,
}

/// A command failure: a kind plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadInput, message)
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    #[must_use]
    pub fn config_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigConflict, message)
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }
}

impl From<QueryError> for CommandError {
    fn from(e: QueryError) -> Self {
        Self::bad_input(e.to_string())
    }
}
