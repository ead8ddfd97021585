//! Distributed advisory locks.
//!
//! Cross-node mutual exclusion via one document per lock name in a shared
//! configuration store. The only normative transition is the CAS
//! `(state=0) -> (state=1, who, when, why)` and its inverse; everything
//! else is diagnostics.
//!
//! Re-entry is per-process with explicit counting: the lock document's
//! `who` identifies a process, so a second `try_lock` from the same
//! process (any thread) succeeds and bumps a counter that `unlock`
//! unwinds.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use drove_core::ProcessIdentity;

// ---------------------------------------------------------------------------
// Lock document / store seam
// ---------------------------------------------------------------------------

/// The lock document: `{_id: name, state, who, when, why}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockDoc {
    #[serde(rename = "_id")]
    pub name: String,
    /// `0` free, `1` held.
    pub state: i32,
    pub who: String,
    /// Epoch milliseconds of acquisition; zero when free.
    pub when: u64,
    pub why: String,
}

impl LockDoc {
    #[must_use]
    pub fn free(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: 0,
            who: String::new(),
            when: 0,
            why: String::new(),
        }
    }
}

/// Errors talking to the lock collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lock store failure: {0}")]
pub struct LockStoreError(pub String);

/// The lock collection in the shared configuration store.
pub trait LockStore: Send + Sync {
    /// Reads the document for `name`.
    ///
    /// # Errors
    ///
    /// Propagates store unavailability.
    fn find_one(&self, name: &str) -> Result<Option<LockDoc>, LockStoreError>;

    /// Inserts a free document for `name` unless one exists.
    ///
    /// # Errors
    ///
    /// Propagates store unavailability; "already exists" is not an error.
    fn insert_if_absent(&self, doc: &LockDoc) -> Result<(), LockStoreError>;

    /// The CAS: matches `{_id: name, state: 0}` and sets
    /// `{state: 1, who, when, why}`. Returns whether a document matched.
    ///
    /// # Errors
    ///
    /// Propagates store unavailability.
    fn try_acquire(
        &self,
        name: &str,
        who: &str,
        when: u64,
        why: &str,
    ) -> Result<bool, LockStoreError>;

    /// Unconditionally sets `{_id: name}` back to `{state: 0}`.
    ///
    /// # Errors
    ///
    /// Propagates store unavailability.
    fn force_release(&self, name: &str) -> Result<(), LockStoreError>;
}

// ---------------------------------------------------------------------------
// Process lock identity
// ---------------------------------------------------------------------------

/// The owner id written into `who`: `host:port:starttime:random`,
/// generated once per process at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwnerId(String);

impl LockOwnerId {
    #[must_use]
    pub fn generate(identity: &ProcessIdentity) -> Self {
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let nonce: u32 = rand::random();
        Self(format!(
            "{}:{}:{start}:{nonce}",
            identity.hostname, identity.port
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// DistributedLock
// ---------------------------------------------------------------------------

/// Outcome of a lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAttempt {
    pub got: bool,
    /// The current holder's document, for diagnostics, when denied.
    pub other: Option<LockDoc>,
}

/// One advisory lock: a `(store, name)` pair plus this process's re-entry
/// count.
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
    name: String,
    owner: LockOwnerId,
    /// Process-wide re-entry depth; zero when not held.
    depth: Mutex<u32>,
}

impl DistributedLock {
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>, name: impl Into<String>, owner: LockOwnerId) -> Self {
        Self {
            store,
            name: name.into(),
            owner,
            depth: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        self.owner.as_str()
    }

    /// `true` while this process holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        *self.depth.lock() > 0
    }

    /// Attempts the acquisition CAS.
    ///
    /// Re-entrant for this process. The ensure-exists insert swallows
    /// errors (somebody else may have raced the insert); only the CAS
    /// itself decides.
    ///
    /// # Errors
    ///
    /// Propagates store unavailability from the CAS or the read-back.
    pub fn try_lock(&self, why: &str) -> Result<LockAttempt, LockStoreError> {
        let mut depth = self.depth.lock();
        if *depth > 0 {
            *depth += 1;
            return Ok(LockAttempt {
                got: true,
                other: None,
            });
        }

        if let Err(e) = self.store.insert_if_absent(&LockDoc::free(&self.name)) {
            debug!(lock = %self.name, error = %e, "lock ensure-exists insert failed");
        }

        let acquired = self
            .store
            .try_acquire(&self.name, self.owner.as_str(), now_ms(), why)?;
        if acquired {
            *depth = 1;
            debug!(lock = %self.name, why, "acquired distributed lock");
            return Ok(LockAttempt {
                got: true,
                other: None,
            });
        }

        let other = self.store.find_one(&self.name)?;
        debug!(lock = %self.name, holder = ?other.as_ref().map(|d| d.who.clone()),
               "distributed lock busy");
        Ok(LockAttempt { got: false, other })
    }

    /// Releases one level of re-entry; at depth one, best-effort clears
    /// the document. Ownership is not checked: a stale holder is the
    /// upper layer's concern, which reads `who`/`when` and refuses to
    /// operate under a younger lock.
    pub fn unlock(&self) {
        let mut depth = self.depth.lock();
        match *depth {
            0 => {}
            1 => {
                *depth = 0;
                if let Err(e) = self.store.force_release(&self.name) {
                    warn!(lock = %self.name, error = %e, "distributed unlock failed");
                }
            }
            _ => *depth -= 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoped acquisition
// ---------------------------------------------------------------------------

/// Guard: acquires on construction, releases on drop.
pub struct DistLockTry<'a> {
    lock: &'a DistributedLock,
    got: bool,
    other: Option<LockDoc>,
}

impl<'a> DistLockTry<'a> {
    /// Attempts the lock once.
    ///
    /// # Errors
    ///
    /// Propagates store unavailability.
    pub fn new(lock: &'a DistributedLock, why: &str) -> Result<Self, LockStoreError> {
        let attempt = lock.try_lock(why)?;
        Ok(Self {
            lock,
            got: attempt.got,
            other: attempt.other,
        })
    }

    /// Did this guard acquire the lock?
    #[must_use]
    pub fn got(&self) -> bool {
        self.got
    }

    /// Who holds it instead, when not us.
    #[must_use]
    pub fn other(&self) -> Option<&LockDoc> {
        self.other.as_ref()
    }
}

impl Drop for DistLockTry<'_> {
    fn drop(&mut self) {
        if self.got {
            self.lock.unlock();
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A lock collection in process memory; backs tests and single-process
/// deployments.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    docs: Mutex<std::collections::HashMap<String, LockDoc>>,
}

impl MemoryLockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for MemoryLockStore {
    fn find_one(&self, name: &str) -> Result<Option<LockDoc>, LockStoreError> {
        Ok(self.docs.lock().get(name).cloned())
    }

    fn insert_if_absent(&self, doc: &LockDoc) -> Result<(), LockStoreError> {
        self.docs
            .lock()
            .entry(doc.name.clone())
            .or_insert_with(|| doc.clone());
        Ok(())
    }

    fn try_acquire(
        &self,
        name: &str,
        who: &str,
        when: u64,
        why: &str,
    ) -> Result<bool, LockStoreError> {
        let mut docs = self.docs.lock();
        match docs.get_mut(name) {
            Some(doc) if doc.state == 0 => {
                doc.state = 1;
                doc.who = who.to_string();
                doc.when = when;
                doc.why = why.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn force_release(&self, name: &str) -> Result<(), LockStoreError> {
        if let Some(doc) = self.docs.lock().get_mut(name) {
            doc.state = 0;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(tag: u16) -> LockOwnerId {
        LockOwnerId::generate(&ProcessIdentity::new("router", tag))
    }

    fn lock_pair() -> (Arc<MemoryLockStore>, DistributedLock, DistributedLock) {
        let store = Arc::new(MemoryLockStore::new());
        let a = DistributedLock::new(Arc::clone(&store) as _, "balancer", owner(1));
        let b = DistributedLock::new(Arc::clone(&store) as _, "balancer", owner(2));
        (store, a, b)
    }

    #[test]
    fn acquire_then_release_leaves_state_zero() {
        let (store, a, _b) = lock_pair();
        let attempt = a.try_lock("doing balance round").unwrap();
        assert!(attempt.got);

        let doc = store.find_one("balancer").unwrap().unwrap();
        assert_eq!(doc.state, 1);
        assert_eq!(doc.who, a.owner_id());
        assert_eq!(doc.why, "doing balance round");
        assert!(doc.when > 0);

        a.unlock();
        let doc = store.find_one("balancer").unwrap().unwrap();
        assert_eq!(doc.state, 0);
        assert!(!a.is_locked());
    }

    #[test]
    fn exactly_one_contender_wins() {
        let (_store, a, b) = lock_pair();
        let ra = a.try_lock("round").unwrap();
        let rb = b.try_lock("round").unwrap();

        assert!(ra.got);
        assert!(!rb.got);
        let other = rb.other.expect("loser sees the holder");
        assert_eq!(other.who, a.owner_id());
        assert_eq!(other.state, 1);
    }

    #[test]
    fn concurrent_contention_has_a_single_winner() {
        let store = Arc::new(MemoryLockStore::new());
        let mut handles = Vec::new();
        for i in 0..8_u16 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let lock =
                    DistributedLock::new(store as _, "balancer", owner(i + 1));
                lock.try_lock("round").unwrap().got
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|got| *got)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn reentry_counts_per_process() {
        let (store, a, b) = lock_pair();
        assert!(a.try_lock("one").unwrap().got);
        assert!(a.try_lock("two").unwrap().got, "re-entrant for the process");

        a.unlock();
        assert!(a.is_locked(), "still held until the outermost unlock");
        assert!(!b.try_lock("steal").unwrap().got);

        a.unlock();
        assert!(!a.is_locked());
        assert_eq!(store.find_one("balancer").unwrap().unwrap().state, 0);
        assert!(b.try_lock("steal").unwrap().got);
    }

    #[test]
    fn unlock_without_hold_is_harmless() {
        let (_store, a, _b) = lock_pair();
        a.unlock();
        assert!(!a.is_locked());
    }

    #[test]
    fn guard_releases_on_drop() {
        let (store, a, b) = lock_pair();
        {
            let guard = DistLockTry::new(&a, "scoped").unwrap();
            assert!(guard.got());
            assert!(guard.other().is_none());
            assert!(!b.try_lock("no").unwrap().got);
        }
        assert_eq!(store.find_one("balancer").unwrap().unwrap().state, 0);
        assert!(b.try_lock("yes").unwrap().got);
    }

    #[test]
    fn losing_guard_reports_the_holder() {
        let (_store, a, b) = lock_pair();
        let _held = DistLockTry::new(&a, "first").unwrap();
        let loser = DistLockTry::new(&b, "second").unwrap();
        assert!(!loser.got());
        assert_eq!(loser.other().unwrap().who, a.owner_id());
    }

    #[test]
    fn owner_ids_embed_endpoint_and_differ() {
        let a = LockOwnerId::generate(&ProcessIdentity::new("r1", 7100));
        let b = LockOwnerId::generate(&ProcessIdentity::new("r1", 7100));
        assert!(a.as_str().starts_with("r1:7100:"));
        assert_ne!(a, b, "random component separates same-endpoint processes");
    }
}
