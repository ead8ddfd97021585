//! Router-side cursor federation.
//!
//! A query fanning out to N shards gets one clustered cursor merging the
//! per-shard streams, wrapped in a [`ShardedClientCursor`] that enforces
//! the network batching contract and lives in the [`CursorCache`] between
//! `getMore`s.

pub mod cache;
pub mod cursor;

pub use cache::{CursorCache, ShardClient, ShardedClientCursor, FIRST_BATCH_MAX_BYTES};
pub use cursor::{
    ClusterCursor, CursorError, MergeSortClusterCursor, SerialClusterCursor, ShardCursor,
    VecShardCursor,
};
