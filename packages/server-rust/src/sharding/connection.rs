//! Per-connection sharding context.

use std::collections::HashMap;

use drove_core::ChunkVersion;

/// Sharding state scoped to one client connection: the last chunk version
/// the router sent for each namespace on this socket, plus the router's
/// server id.
///
/// Owned by the connection handler and passed explicitly to whatever needs
/// it; there is no ambient per-thread copy.
#[derive(Debug, Default)]
pub struct ShardedConnectionInfo {
    server_id: Option<String>,
    versions: HashMap<String, ChunkVersion>,
}

impl ShardedConnectionInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    /// Records the router's server id on first sight.
    ///
    /// Returns `false` when an id was already recorded and differs.
    #[must_use]
    pub fn set_server_id(&mut self, id: &str) -> bool {
        match &self.server_id {
            None => {
                self.server_id = Some(id.to_string());
                true
            }
            Some(existing) => existing == id,
        }
    }

    /// The version last sent on this connection for `ns` (unset when never
    /// sent).
    #[must_use]
    pub fn version(&self, ns: &str) -> ChunkVersion {
        self.versions.get(ns).copied().unwrap_or(ChunkVersion::UNSET)
    }

    pub fn set_version(&mut self, ns: &str, version: ChunkVersion) {
        self.versions.insert(ns.to_string(), version);
    }

    pub fn clear_version(&mut self, ns: &str) {
        self.versions.remove(ns);
    }

    /// `true` when this connection ever negotiated a version for any
    /// namespace.
    #[must_use]
    pub fn is_sharded(&self) -> bool {
        !self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_defaults_to_unset() {
        let info = ShardedConnectionInfo::new();
        assert_eq!(info.version("a.b"), ChunkVersion::UNSET);
        assert!(!info.is_sharded());
    }

    #[test]
    fn set_and_clear_version() {
        let mut info = ShardedConnectionInfo::new();
        info.set_version("a.b", ChunkVersion(5));
        assert_eq!(info.version("a.b"), ChunkVersion(5));
        assert!(info.is_sharded());
        info.clear_version("a.b");
        assert_eq!(info.version("a.b"), ChunkVersion::UNSET);
    }

    #[test]
    fn server_id_sticks_once_set() {
        let mut info = ShardedConnectionInfo::new();
        assert!(info.set_server_id("router-1"));
        assert!(info.set_server_id("router-1"));
        assert!(!info.set_server_id("router-2"));
        assert_eq!(info.server_id(), Some("router-1"));
    }
}
