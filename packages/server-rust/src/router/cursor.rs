//! Clustered cursors: merging N per-shard result streams into one.

use async_trait::async_trait;

use drove_core::{Document, Value};

/// Errors from a shard sub-cursor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("shard {shard} unreachable: {message}")]
    ShardUnreachable { shard: String, message: String },
    #[error("cursor already exhausted")]
    Exhausted,
}

/// One shard's result stream.
#[async_trait]
pub trait ShardCursor: Send {
    /// The next document, or `None` at exhaustion.
    async fn next(&mut self) -> Result<Option<Document>, CursorError>;

    /// The shard this stream comes from.
    fn origin(&self) -> &str;
}

/// A merged stream over all relevant shards.
#[async_trait]
pub trait ClusterCursor: Send {
    /// The next merged document, or `None` when every sub-cursor is done.
    async fn next(&mut self) -> Result<Option<Document>, CursorError>;
}

// ---------------------------------------------------------------------------
// Serial federation
// ---------------------------------------------------------------------------

/// Drains sub-cursors one after another; used when the client asked for no
/// particular order.
pub struct SerialClusterCursor {
    cursors: Vec<Box<dyn ShardCursor>>,
    current: usize,
}

impl SerialClusterCursor {
    #[must_use]
    pub fn new(cursors: Vec<Box<dyn ShardCursor>>) -> Self {
        Self {
            cursors,
            current: 0,
        }
    }
}

#[async_trait]
impl ClusterCursor for SerialClusterCursor {
    async fn next(&mut self) -> Result<Option<Document>, CursorError> {
        while self.current < self.cursors.len() {
            if let Some(doc) = self.cursors[self.current].next().await? {
                return Ok(Some(doc));
            }
            self.current += 1;
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Merge-sort federation
// ---------------------------------------------------------------------------

/// Merges sub-cursors by a sort key, assuming each shard returns its
/// documents already ordered by that key.
pub struct MergeSortClusterCursor {
    /// Peeked head per sub-cursor; `None` once exhausted.
    lanes: Vec<Lane>,
    sort: Vec<(String, i32)>,
    primed: bool,
}

struct Lane {
    head: Option<Document>,
    cursor: Box<dyn ShardCursor>,
}

impl MergeSortClusterCursor {
    #[must_use]
    pub fn new(cursors: Vec<Box<dyn ShardCursor>>, sort: Vec<(String, i32)>) -> Self {
        Self {
            lanes: cursors
                .into_iter()
                .map(|cursor| Lane { head: None, cursor })
                .collect(),
            sort,
            primed: false,
        }
    }

    /// Compares two documents along the sort specification. Missing fields
    /// sort as `Null`.
    fn sort_cmp(&self, a: &Document, b: &Document) -> std::cmp::Ordering {
        for (field, dir) in &self.sort {
            let av = a.get(field).unwrap_or(&Value::Null);
            let bv = b.get(field).unwrap_or(&Value::Null);
            let ord = av.cmp(bv);
            let ord = if *dir < 0 { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    }
}

#[async_trait]
impl ClusterCursor for MergeSortClusterCursor {
    async fn next(&mut self) -> Result<Option<Document>, CursorError> {
        if !self.primed {
            for lane in &mut self.lanes {
                lane.head = lane.cursor.next().await?;
            }
            self.primed = true;
        }

        let mut best: Option<usize> = None;
        for (i, lane) in self.lanes.iter().enumerate() {
            let Some(head) = &lane.head else { continue };
            match best {
                None => best = Some(i),
                Some(b) => {
                    let current = self.lanes[b].head.as_ref().expect("best lane has a head");
                    if self.sort_cmp(head, current) == std::cmp::Ordering::Less {
                        best = Some(i);
                    }
                }
            }
        }

        let Some(i) = best else { return Ok(None) };
        let doc = self.lanes[i].head.take();
        self.lanes[i].head = self.lanes[i].cursor.next().await?;
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// A sub-cursor over an in-memory batch, standing in for one shard.
pub struct VecShardCursor {
    origin: String,
    docs: std::collections::VecDeque<Document>,
}

impl VecShardCursor {
    #[must_use]
    pub fn new(origin: impl Into<String>, docs: Vec<Document>) -> Self {
        Self {
            origin: origin.into(),
            docs: docs.into(),
        }
    }
}

#[async_trait]
impl ShardCursor for VecShardCursor {
    async fn next(&mut self) -> Result<Option<Document>, CursorError> {
        Ok(self.docs.pop_front())
    }

    fn origin(&self) -> &str {
        &self.origin
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
