//! The admin command surface.
//!
//! Commands register by name; the dispatcher acquires each command's
//! declared administrative lock level before invoking its handler, and
//! wraps results into wire replies.

pub mod generic;
pub mod repl;
pub mod sharding;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use drove_core::messages::Reply;
use drove_core::{doc_to_json, Document, ProcessIdentity, Value};

use crate::config::NodeConfig;
use crate::error::{CommandError, ErrorKind};
use crate::repl::{OplogStore, ReplSet};
use crate::router::CursorCache;
use crate::sharding::{ShardedConnectionInfo, ShardingState, WritebackQueue};

pub use generic::{BuildInfoCmd, ListCommandsCmd, PingCmd};
pub use repl::{ReplSetHeartbeatCmd, ReplSetInitiateCmd, ReplSetReconfigCmd};
pub use sharding::{GetShardVersionCmd, SetShardVersionCmd};

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// The process-scoped services handlers operate on. Constructed once at
/// startup and passed by reference; tests wire fakes here instead of
/// mutating globals.
pub struct Services {
    pub config: Arc<NodeConfig>,
    pub identity: ProcessIdentity,
    pub sharding: Arc<ShardingState>,
    pub writebacks: Arc<WritebackQueue>,
    pub cursors: Arc<CursorCache>,
    pub oplog: Arc<dyn OplogStore>,
    /// Present when the process runs with a replica set configured.
    pub repl: Option<Arc<ReplSet>>,
    /// The administrative lock, shared with the op-log writer.
    pub admin_lock: Arc<tokio::sync::RwLock<()>>,
}

// ---------------------------------------------------------------------------
// Command trait / registry
// ---------------------------------------------------------------------------

/// The administrative lock level a command runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockLevel {
    None,
    Read,
    Write,
}

/// Per-invocation context handed to a handler.
pub struct CommandContext<'a> {
    pub registry: &'a CommandRegistry,
    pub services: &'a Services,
    pub conn: &'a mut ShardedConnectionInfo,
}

/// One admin command.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn lock_level(&self) -> LockLevel {
        LockLevel::None
    }

    /// Whether the command is restricted to the admin surface.
    fn admin_only(&self) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &mut CommandContext<'_>,
        body: &Document,
    ) -> Result<Document, CommandError>;
}

/// Name-to-handler registry plus the dispatch discipline.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, Arc<dyn Command>>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard command set.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(PingCmd));
        reg.register(Arc::new(BuildInfoCmd));
        reg.register(Arc::new(ListCommandsCmd));
        reg.register(Arc::new(ReplSetHeartbeatCmd));
        reg.register(Arc::new(ReplSetInitiateCmd));
        reg.register(Arc::new(ReplSetReconfigCmd));
        reg.register(Arc::new(SetShardVersionCmd));
        reg.register(Arc::new(GetShardVersionCmd));
        reg
    }

    pub fn register(&mut self, cmd: Arc<dyn Command>) {
        self.commands.insert(cmd.name(), cmd);
    }

    /// Registered commands with their lock levels and admin flags, sorted
    /// by name.
    #[must_use]
    pub fn list(&self) -> Vec<(&'static str, LockLevel, bool)> {
        let mut out: Vec<_> = self
            .commands
            .values()
            .map(|c| (c.name(), c.lock_level(), c.admin_only()))
            .collect();
        out.sort_by_key(|(name, _, _)| *name);
        out
    }

    /// Runs a command under its declared lock level.
    ///
    /// # Errors
    ///
    /// `BadInput` for unknown commands, plus whatever the handler reports.
    pub async fn dispatch(
        &self,
        name: &str,
        services: &Services,
        conn: &mut ShardedConnectionInfo,
        body: &Document,
    ) -> Result<Document, CommandError> {
        let cmd = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::bad_input(format!("no such command: {name}")))?;

        let lock = &services.admin_lock;
        let (_read, _write);
        match cmd.lock_level() {
            LockLevel::None => {
                _read = None;
                _write = None;
            }
            LockLevel::Read => {
                _read = Some(lock.read().await);
                _write = None;
            }
            LockLevel::Write => {
                _read = None;
                _write = Some(lock.write().await);
            }
        }

        let mut ctx = CommandContext {
            registry: self,
            services,
            conn,
        };
        cmd.run(&mut ctx, body).await
    }
}

/// Wraps a command result into a wire reply. Success documents gain
/// `ok: 1`; errors become the error variant with the flag matching their
/// kind.
#[must_use]
pub fn command_reply(result: Result<Document, CommandError>) -> Reply {
    match result {
        Ok(mut doc) => {
            doc.entry("ok".to_string()).or_insert(Value::Int(1));
            Reply::documents(0, 0, vec![doc])
        }
        Err(e) if e.kind == ErrorKind::StaleConfig => Reply::stale_config(e.message),
        Err(e) => Reply::error(e.message),
    }
}

// ---------------------------------------------------------------------------
// Document (de)serialization helpers
// ---------------------------------------------------------------------------

/// Serializes a payload struct into a reply document.
///
/// # Errors
///
/// `BadInput` when the payload does not shape into a document.
pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Document, CommandError> {
    let json = serde_json::to_value(value)
        .map_err(|e| CommandError::bad_input(format!("unencodable payload: {e}")))?;
    match Value::from(json) {
        Value::Map(m) => Ok(m),
        _ => Err(CommandError::bad_input("payload is not a document")),
    }
}

/// Deserializes a command body into a typed payload.
///
/// # Errors
///
/// `BadInput` when fields are missing or mistyped.
pub(crate) fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T, CommandError> {
    serde_json::from_value(doc_to_json(doc))
        .map_err(|e| CommandError::bad_input(format!("bad command body: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use drove_core::ProcessIdentity;

    use crate::config::NodeConfig;
    use crate::repl::MemoryOplog;
    use crate::router::CursorCache;
    use crate::sharding::{ShardingState, WritebackQueue};

    use super::Services;

    pub fn services() -> Services {
        Services {
            config: Arc::new(NodeConfig::default()),
            identity: ProcessIdentity::new("db1", 7100),
            sharding: Arc::new(ShardingState::new()),
            writebacks: Arc::new(WritebackQueue::new()),
            cursors: Arc::new(CursorCache::new()),
            oplog: Arc::new(MemoryOplog::new()),
            repl: None,
            admin_lock: Arc::new(tokio::sync::RwLock::new(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drove_core::messages::{reply_flags, ReplyBody};
    use drove_core::{doc_from_json, DocumentExt};
    use serde_json::json;

    #[tokio::test]
    async fn unknown_command_is_bad_input() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();
        let mut conn = ShardedConnectionInfo::new();
        let err = reg
            .dispatch("frobnicate", &services, &mut conn, &Document::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadInput);
    }

    #[tokio::test]
    async fn builtin_registry_lists_commands_sorted() {
        let reg = CommandRegistry::with_builtins();
        let names: Vec<&str> = reg.list().iter().map(|(n, _, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "buildInfo",
                "getShardVersion",
                "listCommands",
                "ping",
                "replSetHeartbeat",
                "replSetInitiate",
                "replSetReconfig",
                "setShardVersion",
            ]
        );
    }

    #[tokio::test]
    async fn dispatch_runs_under_the_declared_write_lock() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();

        // Hold the admin lock for reading: a Write-level command must wait.
        let read_guard = services.admin_lock.clone();
        let held = read_guard.try_write();
        assert!(held.is_ok(), "lock free initially");
        drop(held);

        let mut conn = ShardedConnectionInfo::new();
        // setShardVersion declares Write; dispatch must complete once the
        // lock is free.
        let err = reg
            .dispatch(
                "setShardVersion",
                &services,
                &mut conn,
                &doc_from_json(json!({})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadInput, "empty body fails parsing");
    }

    #[test]
    fn command_reply_wraps_results() {
        let ok = command_reply(Ok(doc_from_json(json!({"n": 1}))));
        match ok.body {
            ReplyBody::Documents(docs) => {
                assert_eq!(docs[0].get_i64("ok"), Some(1));
                assert_eq!(docs[0].get_i64("n"), Some(1));
            }
            ReplyBody::Error { .. } => panic!("expected documents"),
        }

        let stale = command_reply(Err(CommandError::new(ErrorKind::StaleConfig, "old")));
        assert_ne!(stale.flags & reply_flags::SHARD_CONFIG_STALE, 0);

        let plain = command_reply(Err(CommandError::bad_input("nope")));
        assert_ne!(plain.flags & reply_flags::ERR_SET, 0);
        assert_eq!(plain.flags & reply_flags::SHARD_CONFIG_STALE, 0);
    }
}
