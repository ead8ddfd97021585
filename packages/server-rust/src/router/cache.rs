//! Sharded client cursors and the router-side cursor cache.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use drove_core::messages::Reply;
use drove_core::Document;

use super::cursor::{ClusterCursor, CursorError};

/// Soft byte cap for the first reply batch; later batches allow three
/// times this.
pub const FIRST_BATCH_MAX_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// ShardedClientCursor
// ---------------------------------------------------------------------------

/// The client-visible cursor the router keeps between `getMore`s: a
/// clustered cursor plus the network batching bookkeeping.
pub struct ShardedClientCursor {
    id: u64,
    cursor: Box<dyn ClusterCursor>,
    skip: usize,
    total_sent: i32,
    done: bool,
    /// One-document lookahead so exhaustion is known before replying.
    pending: Option<Document>,
}

impl ShardedClientCursor {
    /// Wraps a clustered cursor under a non-zero cache id.
    ///
    /// # Panics
    ///
    /// Panics on a zero id: zero is the wire's "no cursor".
    #[must_use]
    pub fn new(id: u64, cursor: Box<dyn ClusterCursor>, skip: usize) -> Self {
        assert!(id != 0, "cursor id zero is reserved");
        Self {
            id,
            cursor,
            skip,
            total_sent: 0,
            done: false,
            pending: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `true` once the cursor yielded everything and replied with id zero.
    #[must_use]
    pub fn done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn total_sent(&self) -> i32 {
        self.total_sent
    }

    async fn next_doc(&mut self) -> Result<Option<Document>, CursorError> {
        if let Some(doc) = self.pending.take() {
            return Ok(Some(doc));
        }
        self.cursor.next().await
    }

    /// Builds the next reply batch.
    ///
    /// `ntoreturn` semantics follow the wire contract: `0` means "fill a
    /// batch", a positive value is a soft per-batch limit, and a negative
    /// value is a hard total limit after which the cursor will not be
    /// called again. The buffer also stops past a soft byte cap: 1 MiB for
    /// the first batch, 3 MiB thereafter.
    ///
    /// # Errors
    ///
    /// `Exhausted` when called after `done`; shard errors propagate.
    pub async fn send_next_batch(&mut self, ntoreturn: i32) -> Result<Reply, CursorError> {
        if self.done {
            return Err(CursorError::Exhausted);
        }

        let max_bytes = if self.total_sent > 0 {
            FIRST_BATCH_MAX_BYTES * 3
        } else {
            FIRST_BATCH_MAX_BYTES
        };

        while self.skip > 0 {
            if self.next_doc().await?.is_none() {
                break;
            }
            self.skip -= 1;
        }

        let mut docs: Vec<Document> = Vec::new();
        let mut bytes = 0_usize;
        let mut num: i32 = 0;
        let mut send_more = true;

        while let Some(doc) = self.next_doc().await? {
            bytes += rmp_serde::to_vec_named(&doc).map(|b| b.len()).unwrap_or(0);
            docs.push(doc);
            num += 1;

            if bytes > max_bytes {
                break;
            }
            if num == ntoreturn {
                // Soft limit: batch size.
                break;
            }
            if ntoreturn < 0 && num + self.total_sent == -ntoreturn {
                // Hard limit: total to send.
                send_more = false;
                break;
            }
        }

        let has_more = if send_more {
            self.pending = self.cursor.next().await?;
            self.pending.is_some()
        } else {
            false
        };
        debug!(id = self.id, num, total_sent = self.total_sent, has_more, "cursor batch");

        let reply = Reply::documents(
            if has_more { self.id } else { 0 },
            self.total_sent,
            docs,
        );
        self.total_sent += num;
        self.done = !has_more;
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// Kill forwarding seam
// ---------------------------------------------------------------------------

/// The slice of shard RPC the cache needs: killing a cursor that lives on
/// a single shard.
#[async_trait]
pub trait ShardClient: Send + Sync {
    async fn kill_cursor(&self, server: &str, cursor_id: u64) -> Result<(), CursorError>;
}

// ---------------------------------------------------------------------------
// CursorCache
// ---------------------------------------------------------------------------

struct CacheInner {
    /// Cursors owned here, keyed by id.
    cursors: HashMap<u64, ShardedClientCursor>,
    /// Cursors living wholly on one shard: id to origin server.
    refs: HashMap<u64, String>,
}

/// The router's cursor registry.
///
/// One mutex guards both maps; it is never held across network I/O. A
/// cursor is executed only by the caller that withdrew it with
/// [`checkout`](Self::checkout), and returns via
/// [`hand_back`](Self::hand_back).
pub struct CursorCache {
    inner: Mutex<CacheInner>,
}

impl Default for CursorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                cursors: HashMap::new(),
                refs: HashMap::new(),
            }),
        }
    }

    /// A fresh non-zero id not currently in use.
    #[must_use]
    pub fn new_cursor_id(&self) -> u64 {
        let inner = self.inner.lock();
        loop {
            let id: u64 = rand::random();
            if id != 0 && !inner.cursors.contains_key(&id) && !inner.refs.contains_key(&id) {
                return id;
            }
        }
    }

    /// Stores a cursor for later `getMore`s.
    pub fn store(&self, cursor: ShardedClientCursor) {
        self.inner.lock().cursors.insert(cursor.id(), cursor);
    }

    /// Records a single-shard cursor living on `server`. Id zero (no
    /// cursor) is never stored.
    pub fn store_ref(&self, id: u64, server: impl Into<String>) {
        if id == 0 {
            return;
        }
        self.inner.lock().refs.insert(id, server.into());
    }

    /// Withdraws a cursor for exclusive use; the cache gives up ownership
    /// until [`hand_back`](Self::hand_back).
    #[must_use]
    pub fn checkout(&self, id: u64) -> Option<ShardedClientCursor> {
        let cursor = self.inner.lock().cursors.remove(&id);
        if cursor.is_none() {
            debug!(id, "cursor cache miss");
        }
        cursor
    }

    /// Returns a withdrawn cursor; exhausted cursors are dropped instead.
    pub fn hand_back(&self, cursor: ShardedClientCursor) {
        if cursor.done() {
            return;
        }
        self.inner.lock().cursors.insert(cursor.id(), cursor);
    }

    pub fn remove(&self, id: u64) {
        self.inner.lock().cursors.remove(&id);
    }

    /// Handles a kill-cursors request: owned cursors are dropped; known
    /// refs are forwarded to their origin shard; unknown ids are logged.
    /// The cache lock is released before any forwarding I/O.
    pub async fn kill_cursors(&self, ids: &[u64], shards: &dyn ShardClient) {
        for &id in ids {
            let server = {
                let mut inner = self.inner.lock();
                if inner.cursors.remove(&id).is_some() {
                    continue;
                }
                match inner.refs.remove(&id) {
                    Some(server) => server,
                    None => {
                        warn!(id, "can't find cursor to kill");
                        continue;
                    }
                }
            };
            if let Err(e) = shards.kill_cursor(&server, id).await {
                warn!(id, server = %server, error = %e, "kill-cursor forward failed");
            }
        }
    }

    /// Cache occupancy for diagnostics: `(owned, refs, total)`.
    #[must_use]
    pub fn info(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        let owned = inner.cursors.len();
        let refs = inner.refs.len();
        (owned, refs, owned + refs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::cursor::{SerialClusterCursor, VecShardCursor};
    use super::*;
    use drove_core::messages::ReplyBody;
    use drove_core::doc_from_json;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;

    fn docs(n: usize, start: i64) -> Vec<Document> {
        (0..n)
            .map(|i| doc_from_json(json!({"k": start + i as i64})))
            .collect()
    }

    fn two_shard_cursor(id: u64, first: usize, second: usize) -> ShardedClientCursor {
        let second_start = i64::try_from(first).expect("small test sizes");
        let cluster = SerialClusterCursor::new(vec![
            Box::new(VecShardCursor::new("s1", docs(first, 0))),
            Box::new(VecShardCursor::new("s2", docs(second, second_start))),
        ]);
        ShardedClientCursor::new(id, Box::new(cluster), 0)
    }

    fn batch_len(reply: &Reply) -> usize {
        match &reply.body {
            ReplyBody::Documents(d) => d.len(),
            ReplyBody::Error { .. } => panic!("unexpected error reply"),
        }
    }

    // -- batch contract --

    #[tokio::test]
    async fn merges_two_shards_with_batch_size_100() {
        // 150 + 70 documents, batchSize=100: 100, 100, then 20 with
        // cursor id zero.
        let mut cursor = two_shard_cursor(7, 150, 70);

        let b1 = cursor.send_next_batch(100).await.unwrap();
        assert_eq!(batch_len(&b1), 100);
        assert_eq!(b1.cursor_id, 7);
        assert_eq!(b1.starting_from, 0);

        let b2 = cursor.send_next_batch(100).await.unwrap();
        assert_eq!(batch_len(&b2), 100);
        assert_eq!(b2.cursor_id, 7);
        assert_eq!(b2.starting_from, 100);

        let b3 = cursor.send_next_batch(100).await.unwrap();
        assert_eq!(batch_len(&b3), 20);
        assert_eq!(b3.cursor_id, 0, "exhausted cursor replies with id zero");
        assert_eq!(b3.starting_from, 200);
        assert!(cursor.done());
    }

    #[tokio::test]
    async fn exact_batch_boundary_needs_a_final_empty_batch() {
        let mut cursor = two_shard_cursor(7, 10, 0);
        let b1 = cursor.send_next_batch(10).await.unwrap();
        assert_eq!(batch_len(&b1), 10);
        // Lookahead saw the end; id is zero immediately.
        assert_eq!(b1.cursor_id, 0);
        assert!(cursor.done());
    }

    #[tokio::test]
    async fn negative_ntoreturn_is_a_hard_total_limit() {
        let mut cursor = two_shard_cursor(7, 50, 50);
        let b = cursor.send_next_batch(-30).await.unwrap();
        assert_eq!(batch_len(&b), 30);
        assert_eq!(b.cursor_id, 0, "hard limit means no further batches");
        assert!(cursor.done());
    }

    #[tokio::test]
    async fn zero_ntoreturn_drains_everything_under_the_byte_cap() {
        let mut cursor = two_shard_cursor(7, 5, 3);
        let b = cursor.send_next_batch(0).await.unwrap();
        assert_eq!(batch_len(&b), 8);
        assert_eq!(b.cursor_id, 0);
    }

    #[tokio::test]
    async fn skip_discards_before_the_first_batch() {
        let cluster = SerialClusterCursor::new(vec![Box::new(VecShardCursor::new(
            "s1",
            docs(10, 0),
        ))]);
        let mut cursor = ShardedClientCursor::new(9, Box::new(cluster), 4);
        let b = cursor.send_next_batch(0).await.unwrap();
        assert_eq!(batch_len(&b), 6);
        match &b.body {
            ReplyBody::Documents(d) => {
                assert_eq!(d[0].get("k").and_then(drove_core::Value::as_i64), Some(4));
            }
            ReplyBody::Error { .. } => unreachable!(),
        }
    }

    #[tokio::test]
    async fn batch_after_done_is_an_error() {
        let mut cursor = two_shard_cursor(7, 1, 0);
        cursor.send_next_batch(0).await.unwrap();
        assert!(cursor.done());
        assert_eq!(
            cursor.send_next_batch(0).await.unwrap_err(),
            CursorError::Exhausted
        );
    }

    #[test]
    #[should_panic(expected = "cursor id zero is reserved")]
    fn zero_id_is_rejected() {
        let cluster = SerialClusterCursor::new(vec![]);
        let _ = ShardedClientCursor::new(0, Box::new(cluster), 0);
    }

    // -- cache --

    struct RecordingShardClient {
        killed: PlMutex<Vec<(String, u64)>>,
    }

    #[async_trait]
    impl ShardClient for RecordingShardClient {
        async fn kill_cursor(&self, server: &str, cursor_id: u64) -> Result<(), CursorError> {
            self.killed.lock().push((server.to_string(), cursor_id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn checkout_withdraws_ownership() {
        let cache = CursorCache::new();
        cache.store(two_shard_cursor(11, 3, 0));

        let c = cache.checkout(11).expect("stored cursor");
        assert!(cache.checkout(11).is_none(), "withdrawn while in use");
        cache.hand_back(c);
        assert!(cache.checkout(11).is_some());
    }

    #[tokio::test]
    async fn exhausted_cursor_is_not_handed_back() {
        let cache = CursorCache::new();
        cache.store(two_shard_cursor(11, 1, 0));
        let mut c = cache.checkout(11).unwrap();
        c.send_next_batch(0).await.unwrap();
        cache.hand_back(c);
        assert!(cache.checkout(11).is_none());
        assert_eq!(cache.info(), (0, 0, 0));
    }

    #[tokio::test]
    async fn kill_removes_owned_and_forwards_refs() {
        let cache = CursorCache::new();
        cache.store(two_shard_cursor(21, 3, 0));
        cache.store_ref(22, "shard-b:7100");
        cache.store_ref(0, "never-stored");

        let shards = RecordingShardClient {
            killed: PlMutex::new(Vec::new()),
        };
        cache.kill_cursors(&[21, 22, 99], &shards).await;

        assert!(cache.checkout(21).is_none());
        assert_eq!(cache.info(), (0, 0, 0));
        let killed = shards.killed.lock();
        assert_eq!(killed.as_slice(), &[("shard-b:7100".to_string(), 22)]);
    }

    #[tokio::test]
    async fn new_cursor_ids_are_nonzero_and_unique() {
        let cache = Arc::new(CursorCache::new());
        let a = cache.new_cursor_id();
        let b = cache.new_cursor_id();
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn info_counts_both_maps() {
        let cache = CursorCache::new();
        cache.store(two_shard_cursor(31, 1, 0));
        cache.store_ref(32, "s1");
        cache.store_ref(33, "s2");
        assert_eq!(cache.info(), (1, 2, 3));
    }
}
