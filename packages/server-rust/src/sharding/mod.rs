//! Sharding coordination on a storage node.
//!
//! Tracks per-namespace chunk versions in two tables (the node-global
//! authoritative one, and a per-connection one holding what each router
//! last negotiated) and gates every incoming op on their agreement.

pub mod connection;
pub mod state;
pub mod writeback;

pub use connection::ShardedConnectionInfo;
pub use state::{
    SetShardVersionAck, SetShardVersionRequest, ShardVersionError, ShardingState, StaleVersion,
};
pub use writeback::{WritebackEntry, WritebackQueue};

use drove_core::messages::{MsgHeader, OpCode, Reply};
use tracing::warn;

/// Outcome of the stale-version gate for one inbound message.
#[derive(Debug)]
pub enum ShardedMessageAction {
    /// The op's version checks out (or no check applies); process it.
    Proceed,
    /// Query-class op with a stale version: send this reply instead.
    StaleReply(Reply),
    /// Write-class op with a stale version: queued as a writeback for the
    /// router; the op itself is consumed.
    WroteBack,
}

/// Gates one inbound message on the chunk-version check.
///
/// `getMore` is exempt: a cursor keeps the configuration epoch it was
/// opened under. A stale write without a negotiated server id has nowhere
/// to be written back to; it is logged and consumed.
#[must_use]
pub fn handle_possible_sharded_message(
    state: &ShardingState,
    writebacks: &WritebackQueue,
    conn: Option<&ShardedConnectionInfo>,
    header: &MsgHeader,
    ns: &str,
    raw_message: &[u8],
) -> ShardedMessageAction {
    if header.op_code == OpCode::GetMore || header.op_code == OpCode::Reply {
        return ShardedMessageAction::Proceed;
    }

    let stale = match state.shard_version_ok(conn, ns) {
        Ok(()) => return ShardedMessageAction::Proceed,
        Err(stale) => stale,
    };
    warn!(ns, %stale.client, %stale.global, "shard version check failed: {}", stale.message);

    if header.op_code.expects_response() {
        return ShardedMessageAction::StaleReply(Reply::stale_config(stale.message));
    }

    match conn.and_then(ShardedConnectionInfo::server_id) {
        Some(server_id) => {
            writebacks.queue(
                server_id,
                WritebackEntry {
                    ns: ns.to_string(),
                    op: header.op_code,
                    message: raw_message.to_vec(),
                },
            );
            ShardedMessageAction::WroteBack
        }
        None => {
            // Write with bad shard config and no server id: nowhere to
            // write it back to.
            warn!(ns, "dropping stale write with no server id");
            ShardedMessageAction::WroteBack
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use drove_core::messages::reply_flags;
    use drove_core::ChunkVersion;

    fn header(op: OpCode) -> MsgHeader {
        MsgHeader {
            len: 32,
            id: 1,
            response_to: 0,
            op_code: op,
        }
    }

    /// Node at global version 7 for `x.y`; router connection stuck at 5.
    fn stale_setup() -> (ShardingState, ShardedConnectionInfo) {
        let state = ShardingState::new();
        let mut conn = ShardedConnectionInfo::new();
        state
            .set_shard_version(
                &mut conn,
                &SetShardVersionRequest {
                    ns: "x.y".to_string(),
                    version: ChunkVersion(5),
                    authoritative: true,
                    server_id: Some("router-1".to_string()),
                    config_server: "cfg1:7100".to_string(),
                },
            )
            .unwrap();
        let mut admin = ShardedConnectionInfo::new();
        state
            .set_shard_version(
                &mut admin,
                &SetShardVersionRequest {
                    ns: "x.y".to_string(),
                    version: ChunkVersion(7),
                    authoritative: false,
                    server_id: Some("router-2".to_string()),
                    config_server: "cfg1:7100".to_string(),
                },
            )
            .unwrap();
        (state, conn)
    }

    #[test]
    fn stale_query_gets_flagged_reply() {
        let (state, conn) = stale_setup();
        let wb = WritebackQueue::new();
        let action = handle_possible_sharded_message(
            &state,
            &wb,
            Some(&conn),
            &header(OpCode::Query),
            "x.y",
            b"raw",
        );
        match action {
            ShardedMessageAction::StaleReply(reply) => {
                assert_ne!(reply.flags & reply_flags::SHARD_CONFIG_STALE, 0);
                assert_ne!(reply.flags & reply_flags::ERR_SET, 0);
            }
            other => panic!("expected stale reply, got {other:?}"),
        }
    }

    #[test]
    fn stale_write_is_queued_as_writeback() {
        let (state, conn) = stale_setup();
        let wb = WritebackQueue::new();
        let raw = b"original message bytes".to_vec();
        let action = handle_possible_sharded_message(
            &state,
            &wb,
            Some(&conn),
            &header(OpCode::Insert),
            "x.y",
            &raw,
        );
        assert!(matches!(action, ShardedMessageAction::WroteBack));

        let drained = wb.drain("router-1");
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].message, raw);
        assert_eq!(drained[0].op, OpCode::Insert);
        assert_eq!(drained[0].ns, "x.y");
    }

    #[test]
    fn get_more_is_exempt() {
        let (state, conn) = stale_setup();
        let wb = WritebackQueue::new();
        let action = handle_possible_sharded_message(
            &state,
            &wb,
            Some(&conn),
            &header(OpCode::GetMore),
            "x.y",
            b"",
        );
        assert!(matches!(action, ShardedMessageAction::Proceed));
    }

    #[test]
    fn current_version_proceeds() {
        let (state, _stale_conn) = stale_setup();
        let wb = WritebackQueue::new();
        let mut fresh = ShardedConnectionInfo::new();
        state
            .set_shard_version(
                &mut fresh,
                &SetShardVersionRequest {
                    ns: "x.y".to_string(),
                    version: ChunkVersion(7),
                    authoritative: false,
                    server_id: Some("router-3".to_string()),
                    config_server: "cfg1:7100".to_string(),
                },
            )
            .unwrap();
        let action = handle_possible_sharded_message(
            &state,
            &wb,
            Some(&fresh),
            &header(OpCode::Query),
            "x.y",
            b"",
        );
        assert!(matches!(action, ShardedMessageAction::Proceed));
    }
}
