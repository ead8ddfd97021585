//! Local-store collaborator seams for the coordinator.
//!
//! The coordinator never touches record files or index pages; it sees the
//! local database only through these traits. `MemoryOplog` and
//! `MemoryConfigStore` back tests; `FileConfigStore` persists the adopted
//! configuration across restarts.

use std::path::PathBuf;

use parking_lot::Mutex;

use drove_core::messages::ReplSetConfigDoc;
use drove_core::OpTime;

/// Errors from the local stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("local store failure: {0}")]
    Io(String),
    #[error("corrupt stored document: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read access to the local op-log.
pub trait OplogStore: Send + Sync {
    /// The op-time of the newest entry, if any.
    ///
    /// # Errors
    ///
    /// A hard error here at startup is fatal to replication.
    fn last_op_time(&self) -> Result<Option<OpTime>, StoreError>;

    /// `true` when the op-log holds no entries.
    ///
    /// # Errors
    ///
    /// Propagates local read failures.
    fn is_empty(&self) -> Result<bool, StoreError>;

    /// `true` when any non-op-log user database exists; answers
    /// `checkEmpty` probes.
    fn has_user_data(&self) -> bool;
}

/// Load/store of the local replica-set configuration document.
pub trait ConfigStore: Send + Sync {
    /// The locally persisted configuration, if one was ever saved.
    ///
    /// # Errors
    ///
    /// `Corrupt` when present but undecodable.
    fn load(&self) -> Result<Option<ReplSetConfigDoc>, StoreError>;

    /// Persists the configuration, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Propagates local write failures.
    fn save(&self, doc: &ReplSetConfigDoc) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// An op-log held in memory.
#[derive(Debug, Default)]
pub struct MemoryOplog {
    inner: Mutex<MemoryOplogInner>,
}

#[derive(Debug, Default)]
struct MemoryOplogInner {
    entries: Vec<OpTime>,
    user_data: bool,
    fail_reads: bool,
}

impl MemoryOplog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, t: OpTime) {
        self.inner.lock().entries.push(t);
    }

    pub fn set_user_data(&self, present: bool) {
        self.inner.lock().user_data = present;
    }

    /// Makes subsequent reads fail, to exercise the fatal startup path.
    pub fn poison(&self) {
        self.inner.lock().fail_reads = true;
    }
}

impl OplogStore for MemoryOplog {
    fn last_op_time(&self) -> Result<Option<OpTime>, StoreError> {
        let inner = self.inner.lock();
        if inner.fail_reads {
            return Err(StoreError::Io("oplog unreadable".to_string()));
        }
        Ok(inner.entries.last().copied())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        let inner = self.inner.lock();
        if inner.fail_reads {
            return Err(StoreError::Io("oplog unreadable".to_string()));
        }
        Ok(inner.entries.is_empty())
    }

    fn has_user_data(&self) -> bool {
        self.inner.lock().user_data
    }
}

/// A configuration store held in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    doc: Mutex<Option<ReplSetConfigDoc>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds the stored document (test setup).
    pub fn seed(&self, doc: ReplSetConfigDoc) {
        *self.doc.lock() = Some(doc);
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Option<ReplSetConfigDoc>, StoreError> {
        Ok(self.doc.lock().clone())
    }

    fn save(&self, doc: &ReplSetConfigDoc) -> Result<(), StoreError> {
        *self.doc.lock() = Some(doc.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed configuration store
// ---------------------------------------------------------------------------

/// Persists the configuration document as MsgPack in a single file.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Option<ReplSetConfigDoc>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        rmp_serde::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn save(&self, doc: &ReplSetConfigDoc) -> Result<(), StoreError> {
        let bytes =
            rmp_serde::to_vec_named(doc).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        std::fs::write(&self.path, bytes).map_err(|e| StoreError::Io(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
