//! Liveness and introspection commands.

use async_trait::async_trait;

use drove_core::{Document, Value};

use crate::error::CommandError;

use super::{Command, CommandContext, LockLevel};

// ---------------------------------------------------------------------------
// ping
// ---------------------------------------------------------------------------

/// Responds immediately, even when the server sits in a database lock.
pub struct PingCmd;

#[async_trait]
impl Command for PingCmd {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn admin_only(&self) -> bool {
        false
    }

    async fn run(
        &self,
        _ctx: &mut CommandContext<'_>,
        _body: &Document,
    ) -> Result<Document, CommandError> {
        Ok(Document::new())
    }
}

// ---------------------------------------------------------------------------
// buildInfo
// ---------------------------------------------------------------------------

pub struct BuildInfoCmd;

#[async_trait]
impl Command for BuildInfoCmd {
    fn name(&self) -> &'static str {
        "buildInfo"
    }

    async fn run(
        &self,
        _ctx: &mut CommandContext<'_>,
        _body: &Document,
    ) -> Result<Document, CommandError> {
        let mut doc = Document::new();
        doc.insert(
            "version".to_string(),
            Value::from(env!("CARGO_PKG_VERSION")),
        );
        doc.insert("bits".to_string(), Value::Int(64));
        doc.insert("debug".to_string(), Value::Bool(cfg!(debug_assertions)));
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// listCommands
// ---------------------------------------------------------------------------

pub struct ListCommandsCmd;

#[async_trait]
impl Command for ListCommandsCmd {
    fn name(&self) -> &'static str {
        "listCommands"
    }

    fn admin_only(&self) -> bool {
        false
    }

    async fn run(
        &self,
        ctx: &mut CommandContext<'_>,
        _body: &Document,
    ) -> Result<Document, CommandError> {
        let mut commands = Document::new();
        for (name, lock, admin_only) in ctx.registry.list() {
            let mut entry = Document::new();
            entry.insert(
                "lock".to_string(),
                Value::from(match lock {
                    LockLevel::None => "none",
                    LockLevel::Read => "read",
                    LockLevel::Write => "write",
                }),
            );
            entry.insert("adminOnly".to_string(), Value::Bool(admin_only));
            commands.insert(name.to_string(), Value::Map(entry));
        }
        let mut doc = Document::new();
        doc.insert("commands".to_string(), Value::Map(commands));
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::{test_support, CommandRegistry};
    use crate::sharding::ShardedConnectionInfo;
    use drove_core::{Document, DocumentExt, Value};

    #[tokio::test]
    async fn ping_answers_ok() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();
        let mut conn = ShardedConnectionInfo::new();
        let doc = reg
            .dispatch("ping", &services, &mut conn, &Document::new())
            .await
            .unwrap();
        assert!(doc.is_empty());
    }

    #[tokio::test]
    async fn build_info_reports_version() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();
        let mut conn = ShardedConnectionInfo::new();
        let doc = reg
            .dispatch("buildInfo", &services, &mut conn, &Document::new())
            .await
            .unwrap();
        assert_eq!(doc.get_str("version"), Some(env!("CARGO_PKG_VERSION")));
        assert_eq!(doc.get_i64("bits"), Some(64));
    }

    #[tokio::test]
    async fn list_commands_reports_lock_levels() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();
        let mut conn = ShardedConnectionInfo::new();
        let doc = reg
            .dispatch("listCommands", &services, &mut conn, &Document::new())
            .await
            .unwrap();
        let commands = doc.get_doc("commands").unwrap();
        assert!(commands.contains_key("ping"));
        match commands.get("setShardVersion") {
            Some(Value::Map(entry)) => {
                assert_eq!(entry.get_str("lock"), Some("write"));
            }
            other => panic!("setShardVersion entry missing: {other:?}"),
        }
    }
}
