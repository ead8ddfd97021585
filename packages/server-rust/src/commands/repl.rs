//! Replica-set admin commands.

use async_trait::async_trait;

use drove_core::messages::{HeartbeatRequest, ReplSetConfigDoc};
use drove_core::{Document, Value};

use crate::error::CommandError;
use crate::repl::{handle_heartbeat, initiate, reconfig};

use super::{from_document, to_document, Command, CommandContext, LockLevel};

// ---------------------------------------------------------------------------
// replSetHeartbeat
// ---------------------------------------------------------------------------

/// The liveness/configuration exchange between set members. Runs without
/// locks: it must answer during pre-initialization states.
pub struct ReplSetHeartbeatCmd;

#[async_trait]
impl Command for ReplSetHeartbeatCmd {
    fn name(&self) -> &'static str {
        "replSetHeartbeat"
    }

    fn admin_only(&self) -> bool {
        false
    }

    async fn run(
        &self,
        ctx: &mut CommandContext<'_>,
        body: &Document,
    ) -> Result<Document, CommandError> {
        let req: HeartbeatRequest = from_document(body)?;
        let repl = ctx.services.repl.as_deref();
        let resp = handle_heartbeat(
            &req,
            repl.map(crate::repl::ReplSet::set_name),
            repl,
            ctx.services.oplog.as_ref(),
        );
        to_document(&resp)
    }
}

// ---------------------------------------------------------------------------
// replSetInitiate
// ---------------------------------------------------------------------------

/// Christens a replica set from a proposed configuration document.
pub struct ReplSetInitiateCmd;

#[async_trait]
impl Command for ReplSetInitiateCmd {
    fn name(&self) -> &'static str {
        "replSetInitiate"
    }

    async fn run(
        &self,
        ctx: &mut CommandContext<'_>,
        body: &Document,
    ) -> Result<Document, CommandError> {
        let Some(rs) = &ctx.services.repl else {
            return Err(CommandError::bad_input(
                "server is not running with a replica set configured",
            ));
        };
        let proposal: ReplSetConfigDoc = from_document(body)?;
        initiate(rs, &proposal).await?;
        let mut doc = Document::new();
        doc.insert(
            "info".to_string(),
            Value::from("config now saved locally; should come online in about a minute"),
        );
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// replSetReconfig
// ---------------------------------------------------------------------------

/// Installs a higher-version configuration on a running set.
pub struct ReplSetReconfigCmd;

#[async_trait]
impl Command for ReplSetReconfigCmd {
    fn name(&self) -> &'static str {
        "replSetReconfig"
    }

    fn lock_level(&self) -> LockLevel {
        LockLevel::Write
    }

    async fn run(
        &self,
        ctx: &mut CommandContext<'_>,
        body: &Document,
    ) -> Result<Document, CommandError> {
        let Some(rs) = &ctx.services.repl else {
            return Err(CommandError::bad_input(
                "server is not running with a replica set configured",
            ));
        };
        let proposal: ReplSetConfigDoc = from_document(body)?;
        reconfig(rs, &proposal).await?;
        let mut doc = Document::new();
        doc.insert("info".to_string(), Value::from("reconfig accepted"));
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
    use drove_core::{doc_from_json, DocumentExt};
    use serde_json::json;

    #[tokio::test]
    async fn heartbeat_without_replica_set_mode_reports_error() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();
        let mut conn = ShardedConnectionInfo::new();
        let doc = reg
            .dispatch(
                "replSetHeartbeat",
                &services,
                &mut conn,
                &doc_from_json(json!({
                    "setName": "herd",
                    "configVersion": 1,
                    "protocolVersion": 1,
                    "checkEmpty": false
                })),
            )
            .await
            .unwrap();
        assert_eq!(doc.get_bool("ok"), Some(false));
        assert_eq!(doc.get_bool("rs"), Some(false));
    }

    #[tokio::test]
    async fn heartbeat_with_missing_fields_is_bad_input() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();
        let mut conn = ShardedConnectionInfo::new();
        let err = reg
            .dispatch(
                "replSetHeartbeat",
                &services,
                &mut conn,
                &doc_from_json(json!({"setName": "herd"})),
            )
            .await
            .unwrap_err();
        // Missing fields fail body parsing as BadInput.
        assert_eq!(err.kind, crate::error::ErrorKind::BadInput);
    }

    #[tokio::test]
    async fn initiate_without_replica_set_mode_is_rejected() {
        let reg = CommandRegistry::with_builtins();
        let services = test_support::services();
        let mut conn = ShardedConnectionInfo::new();
        let err = reg
            .dispatch(
                "replSetInitiate",
                &services,
                &mut conn,
                &doc_from_json(json!({"_id": "herd", "version": 1, "members": []})),
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("not running with a replica set"));
    }
}
