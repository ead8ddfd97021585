//! Node-global sharding state: the authoritative per-namespace chunk
//! version table and the `setShardVersion` negotiation.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use drove_core::ChunkVersion;

use crate::error::ErrorKind;

use super::connection::ShardedConnectionInfo;

// ---------------------------------------------------------------------------
// Request / response payloads
// ---------------------------------------------------------------------------

/// Payload of the `setShardVersion` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetShardVersionRequest {
    pub ns: String,
    pub version: ChunkVersion,
    pub authoritative: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server_id: Option<String>,
    pub config_server: String,
}

/// Acknowledgement of an accepted `setShardVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetShardVersionAck {
    /// The version previously held by this connection.
    pub old_version: ChunkVersion,
    /// The global version in effect before an authoritative drop, when one
    /// happened.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub before_drop: Option<ChunkVersion>,
}

/// Typed failures of `setShardVersion`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardVersionError {
    #[error("first setShardVersion must be authoritative")]
    NotAuthoritative,
    #[error("specified a different config server (have {ours}, got {theirs})")]
    ConfigMismatch { ours: String, theirs: String },
    #[error("server id has changed")]
    ServerIdChanged,
    #[error("connection already has newer version {old} (requested {requested})")]
    StaleConnection {
        old: ChunkVersion,
        requested: ChunkVersion,
    },
    #[error("cannot go to older version {requested} (global is {global})")]
    StaleGlobal {
        global: ChunkVersion,
        requested: ChunkVersion,
    },
    #[error("first version for this namespace must be authoritative")]
    NeedAuthoritative,
    #[error("dropping needs to be authoritative (global is {global})")]
    DropNeedsAuthoritative { global: ChunkVersion },
}

impl ShardVersionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthoritative
            | Self::NeedAuthoritative
            | Self::DropNeedsAuthoritative { .. } => ErrorKind::NeedAuthoritative,
            Self::ConfigMismatch { .. } | Self::ServerIdChanged => ErrorKind::BadInput,
            Self::StaleConnection { .. } | Self::StaleGlobal { .. } => ErrorKind::StaleConfig,
        }
    }
}

/// Why an op failed the per-op version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleVersion {
    pub ns: String,
    pub client: ChunkVersion,
    pub global: ChunkVersion,
    pub message: String,
}

// ---------------------------------------------------------------------------
// ShardingState
// ---------------------------------------------------------------------------

struct Inner {
    enabled: bool,
    config_server: String,
    versions: HashMap<String, ChunkVersion>,
}

/// Process-global sharding bookkeeping for one storage node.
///
/// Invariant: a namespace's version is non-decreasing except via an
/// authoritative clear back to zero.
pub struct ShardingState {
    inner: Mutex<Inner>,
}

impl Default for ShardingState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardingState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                enabled: false,
                config_server: String::new(),
                versions: HashMap::new(),
            }),
        }
    }

    /// `true` once a configuration server has been adopted.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    #[must_use]
    pub fn config_server(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner.enabled.then(|| inner.config_server.clone())
    }

    /// The node-global version for `ns`; `None` when never set.
    #[must_use]
    pub fn version(&self, ns: &str) -> Option<ChunkVersion> {
        self.inner.lock().versions.get(ns).copied()
    }

    /// Runs the full `setShardVersion` decision table against this node's
    /// global table and the caller's per-connection table.
    ///
    /// # Errors
    ///
    /// Returns a [`ShardVersionError`] describing exactly which rule
    /// rejected the request; the connection and global tables are only
    /// mutated on success.
    pub fn set_shard_version(
        &self,
        conn: &mut ShardedConnectionInfo,
        req: &SetShardVersionRequest,
    ) -> Result<SetShardVersionAck, ShardVersionError> {
        let mut inner = self.inner.lock();

        if inner.enabled {
            if req.config_server != inner.config_server {
                return Err(ShardVersionError::ConfigMismatch {
                    ours: inner.config_server.clone(),
                    theirs: req.config_server.clone(),
                });
            }
        } else {
            if !req.authoritative {
                return Err(ShardVersionError::NotAuthoritative);
            }
            inner.enabled = true;
            inner.config_server = req.config_server.clone();
            info!(config_server = %req.config_server, "sharding enabled");
        }

        if let Some(id) = &req.server_id {
            if !conn.set_server_id(id) {
                return Err(ShardVersionError::ServerIdChanged);
            }
        }

        let old = conn.version(&req.ns);
        let global = inner
            .versions
            .get(&req.ns)
            .copied()
            .unwrap_or(ChunkVersion::UNSET);

        if !req.version.is_set() && !global.is_set() {
            // The connection is cleaning itself.
            conn.clear_version(&req.ns);
            return Ok(SetShardVersionAck {
                old_version: old,
                before_drop: None,
            });
        }

        if !req.version.is_set() && global.is_set() {
            if !req.authoritative {
                return Err(ShardVersionError::DropNeedsAuthoritative { global });
            }
            warn!(ns = %req.ns, "clearing chunk version, clients must re-find metadata");
            inner.versions.insert(req.ns.clone(), ChunkVersion::UNSET);
            conn.clear_version(&req.ns);
            return Ok(SetShardVersionAck {
                old_version: old,
                before_drop: Some(global),
            });
        }

        if req.version < old {
            return Err(ShardVersionError::StaleConnection {
                old,
                requested: req.version,
            });
        }

        if req.version < global {
            return Err(ShardVersionError::StaleGlobal {
                global,
                requested: req.version,
            });
        }

        if !global.is_set() && !req.authoritative {
            return Err(ShardVersionError::NeedAuthoritative);
        }

        conn.set_version(&req.ns, req.version);
        inner.versions.insert(req.ns.clone(), req.version);
        Ok(SetShardVersionAck {
            old_version: old,
            before_drop: None,
        })
    }

    /// The per-op check: `Ok(())` when not in sharded mode, when the
    /// connection never negotiated versions, when `ns` has no version on
    /// this node, or when the client's version is current.
    ///
    /// # Errors
    ///
    /// Returns [`StaleVersion`] when the client must refresh its routing
    /// table first.
    pub fn shard_version_ok(
        &self,
        conn: Option<&ShardedConnectionInfo>,
        ns: &str,
    ) -> Result<(), StaleVersion> {
        if !self.enabled() {
            return Ok(());
        }
        // A connection that never negotiated versions is a direct client;
        // it may do what it wants.
        let Some(conn) = conn.filter(|c| c.is_sharded()) else {
            return Ok(());
        };
        let Some(global) = self.version(ns) else {
            return Ok(());
        };
        let client = conn.version(ns);

        if !global.is_set() && client.is_set() {
            return Err(StaleVersion {
                ns: ns.to_string(),
                client,
                global,
                message: format!("version: {global} clientVersion: {client}"),
            });
        }
        if client >= global {
            return Ok(());
        }
        if !client.is_set() {
            return Err(StaleVersion {
                ns: ns.to_string(),
                client,
                global,
                message: "client in sharded mode, but doesn't have version set for this \
                          collection"
                    .to_string(),
            });
        }
        Err(StaleVersion {
            ns: ns.to_string(),
            client,
            global,
            message: format!("your version is too old  ns: {ns}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
