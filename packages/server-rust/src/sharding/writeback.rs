//! Writeback queues.
//!
//! A write arriving with a stale chunk version cannot simply be rejected:
//! the op codes are fire-and-forget. Instead the original request bytes are
//! queued under the router's server id, and the router collects them, fixes
//! its routing table, and re-dispatches.

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::debug;

use drove_core::messages::OpCode;

/// One queued writeback: the untouched request, ready to re-dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritebackEntry {
    pub ns: String,
    pub op: OpCode,
    /// The original message bytes, header included.
    pub message: Vec<u8>,
}

/// Per-router queues of writebacks, keyed by the router's server id.
#[derive(Debug, Default)]
pub struct WritebackQueue {
    queues: DashMap<String, VecDeque<WritebackEntry>>,
}

impl WritebackQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, server_id: &str, entry: WritebackEntry) {
        debug!(server_id, ns = %entry.ns, len = entry.message.len(), "queueing writeback");
        self.queues
            .entry(server_id.to_string())
            .or_default()
            .push_back(entry);
    }

    /// Takes every queued writeback for a router, oldest first.
    #[must_use]
    pub fn drain(&self, server_id: &str) -> Vec<WritebackEntry> {
        self.queues
            .remove(server_id)
            .map(|(_, q)| q.into_iter().collect())
            .unwrap_or_default()
    }

    /// Queued entries for a router without removing them.
    #[must_use]
    pub fn pending(&self, server_id: &str) -> usize {
        self.queues.get(server_id).map_or(0, |q| q.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ns: &str) -> WritebackEntry {
        WritebackEntry {
            ns: ns.to_string(),
            op: OpCode::Insert,
            message: vec![1, 2, 3],
        }
    }

    #[test]
    fn drains_in_fifo_order() {
        let q = WritebackQueue::new();
        q.queue("r1", entry("a.b"));
        q.queue("r1", entry("c.d"));
        let drained = q.drain("r1");
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].ns, "a.b");
        assert_eq!(drained[1].ns, "c.d");
        assert_eq!(q.pending("r1"), 0);
    }

    #[test]
    fn queues_are_per_router() {
        let q = WritebackQueue::new();
        q.queue("r1", entry("a.b"));
        q.queue("r2", entry("c.d"));
        assert_eq!(q.pending("r1"), 1);
        assert_eq!(q.pending("r2"), 1);
        assert_eq!(q.drain("r1").len(), 1);
        assert_eq!(q.pending("r2"), 1);
    }

    #[test]
    fn drain_unknown_router_is_empty() {
        let q = WritebackQueue::new();
        assert!(q.drain("nobody").is_empty());
    }
}
