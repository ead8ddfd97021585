//! Sharding admin commands.

use async_trait::async_trait;
use serde::Deserialize;

use drove_core::{Document, DocumentExt, Value};

use crate::error::CommandError;
use crate::sharding::SetShardVersionRequest;

use super::{from_document, to_document, Command, CommandContext, LockLevel};

// ---------------------------------------------------------------------------
// setShardVersion
// ---------------------------------------------------------------------------

/// Negotiates a connection's chunk version for one namespace.
pub struct SetShardVersionCmd;

#[async_trait]
impl Command for SetShardVersionCmd {
    fn name(&self) -> &'static str {
        "setShardVersion"
    }

    fn lock_level(&self) -> LockLevel {
        LockLevel::Write
    }

    async fn run(
        &self,
        ctx: &mut CommandContext<'_>,
        body: &Document,
    ) -> Result<Document, CommandError> {
        let req: SetShardVersionRequest = from_document(body)?;
        if req.config_server.is_empty() {
            return Err(CommandError::bad_input("no config server specified"));
        }
        if req.ns.is_empty() {
            return Err(CommandError::bad_input("need to specify a full namespace"));
        }

        let ack = ctx
            .services
            .sharding
            .set_shard_version(ctx.conn, &req)
            .map_err(|e| CommandError::new(e.kind(), e.to_string()))?;
        to_document(&ack)
    }
}

// ---------------------------------------------------------------------------
// getShardVersion
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GetShardVersionBody {
    ns: String,
}

/// Reports the node-global and per-connection versions for a namespace.
pub struct GetShardVersionCmd;

#[async_trait]
impl Command for GetShardVersionCmd {
    fn name(&self) -> &'static str {
        "getShardVersion"
    }

    fn lock_level(&self) -> LockLevel {
        LockLevel::Read
    }

    async fn run(
        &self,
        ctx: &mut CommandContext<'_>,
        body: &Document,
    ) -> Result<Document, CommandError> {
        let req: GetShardVersionBody = from_document(body)?;
        if req.ns.is_empty() {
            return Err(CommandError::bad_input("need to specify a full namespace"));
        }

        let sharding = &ctx.services.sharding;
        let mut doc = Document::new();
        doc.insert(
            "configServer".to_string(),
            Value::from(sharding.config_server().unwrap_or_default()),
        );
        #[allow(clippy::cast_possible_wrap)]
        doc.insert(
            "global".to_string(),
            Value::Int(sharding.version(&req.ns).unwrap_or_default().0 as i64),
        );
        #[allow(clippy::cast_possible_wrap)]
        doc.insert(
            "mine".to_string(),
            Value::Int(ctx.conn.version(&req.ns).0 as i64),
        );
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
