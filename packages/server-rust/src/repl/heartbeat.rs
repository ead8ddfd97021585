//! Heartbeats: the RPC handler, the per-peer poll task, and the transport
//! seam they share.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use drove_core::messages::{
    HeartbeatRequest, HeartbeatResponse, ReplSetConfigDoc, REPL_PROTOCOL_VERSION,
};
use drove_core::Endpoint;

use super::coordinator::{ManagerMsg, ReplSet};
use super::member::HeartbeatInfo;
use super::storage::OplogStore;

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Errors reaching a peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("heartbeat timed out")]
    Timeout,
}

/// Inter-node RPC used by the coordinator: heartbeats and remote
/// configuration fetches. Production wires sockets; tests wire fakes.
#[async_trait]
pub trait ReplTransport: Send + Sync {
    /// Sends one heartbeat and returns the peer's response.
    async fn heartbeat(
        &self,
        target: &Endpoint,
        req: HeartbeatRequest,
    ) -> Result<HeartbeatResponse, TransportError>;

    /// Fetches the replica-set configuration document stored on a peer.
    /// `Ok(None)` means the peer is reachable but holds none.
    async fn fetch_config(
        &self,
        target: &Endpoint,
    ) -> Result<Option<ReplSetConfigDoc>, TransportError>;
}

// ---------------------------------------------------------------------------
// Server side of the RPC
// ---------------------------------------------------------------------------

/// Answers one `replSetHeartbeat`.
///
/// Runs even before the coordinator has a configuration, so preconditions
/// are checked in dependency order: replica-set mode, protocol version,
/// set name, then coordinator state.
#[must_use]
pub fn handle_heartbeat(
    req: &HeartbeatRequest,
    configured_set: Option<&str>,
    repl: Option<&ReplSet>,
    oplog: &dyn OplogStore,
) -> HeartbeatResponse {
    let Some(set_name) = configured_set else {
        return HeartbeatResponse::error("not running with a replica set configured");
    };
    if req.protocol_version != REPL_PROTOCOL_VERSION {
        return HeartbeatResponse::error("incompatible replset protocol version");
    }
    if req.set_name != set_name {
        let mut resp = HeartbeatResponse::error("repl set names do not match");
        resp.mismatch = true;
        return resp;
    }

    let mut resp = HeartbeatResponse {
        ok: true,
        errmsg: None,
        rs: true,
        mismatch: false,
        set: None,
        state: None,
        op_time: None,
        config_version: None,
        config: None,
        has_data: None,
    };
    if req.check_empty {
        resp.has_data = Some(oplog.has_user_data());
    }

    // A coordinator without an adopted configuration is still initializing:
    // it must not claim set membership, or initiate probes would read it as
    // already christened.
    let Some(rs) = repl.filter(|r| r.config().is_some()) else {
        resp.ok = false;
        resp.errmsg = Some("still initializing".to_string());
        return resp;
    };

    resp.set = Some(rs.set_name().to_string());
    resp.state = Some(rs.my_state());
    resp.op_time = Some(rs.last_op_time());
    let v = rs.config_version();
    resp.config_version = Some(v);
    if v > req.config_version {
        resp.config = rs.config().map(|c| c.to_doc());
    }
    resp
}

// ---------------------------------------------------------------------------
// Poll task
// ---------------------------------------------------------------------------

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Applies one heartbeat outcome to the poller's member snapshot. Returns
/// a configuration the peer offered, when it did.
pub(crate) fn apply_heartbeat_result(
    mem: &mut HeartbeatInfo,
    now: u64,
    result: Result<HeartbeatResponse, TransportError>,
) -> Option<ReplSetConfigDoc> {
    match result {
        Ok(resp) => {
            if resp.mismatch {
                mem.mark_down(now, resp.errmsg.as_deref().unwrap_or("set name mismatch"));
                return None;
            }
            if resp.ok {
                let state = resp.state.unwrap_or(mem.state);
                let was_down = !mem.up();
                mem.mark_up(now, state, resp.op_time);
                if was_down {
                    info!(peer = mem.id, "member is now up");
                }
                resp.config
            } else {
                mem.mark_down(now, resp.errmsg.as_deref().unwrap_or("error in heartbeat reply"));
                None
            }
        }
        Err(e) => {
            mem.mark_down(now, "connect/transport error");
            debug!(peer = mem.id, error = %e, "heartbeat failed");
            None
        }
    }
}

/// Spawns the health-poll task for one peer.
///
/// Polls on the configured interval forever (the coordinator aborts the
/// task when the member leaves the configuration). The poller never
/// mutates coordinator state directly: every observation travels to the
/// manager as a message.
pub(crate) fn spawn_health_poll(
    rs: Arc<ReplSet>,
    member_id: u32,
    target: Endpoint,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval_ms = rs.node_config().heartbeat_interval_ms;
        let timeout_ms = rs.node_config().heartbeat_timeout_ms;
        let notify_secs = rs.node_config().manager_notify_ms / 1000;
        let mut mem = HeartbeatInfo::new(member_id);
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_notify = 0_u64;

        loop {
            ticker.tick().await;
            let old = mem.clone();
            let req = HeartbeatRequest {
                set_name: rs.set_name().to_string(),
                config_version: rs.config_version(),
                protocol_version: REPL_PROTOCOL_VERSION,
                check_empty: false,
            };
            let result = match tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                rs.transport().heartbeat(&target, req),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(TransportError::Timeout),
            };

            let now = epoch_secs();
            let offered = apply_heartbeat_result(&mut mem, now, result);
            if let Some(cfg) = offered {
                if cfg.version > rs.config_version() {
                    rs.send_manager(ManagerMsg::NewConfig(cfg));
                } else {
                    debug!(peer = member_id, "peer offered config without a higher version");
                }
            }
            if !mem.up() && mem.changed(&old) {
                warn!(peer = member_id, target = %target, msg = %mem.last_heartbeat_msg,
                      "member is now down");
            }

            rs.send_manager(ManagerMsg::UpdateHeartbeat(mem.clone()));
            if mem.changed(&old) || now.saturating_sub(last_notify) >= notify_secs {
                last_notify = now;
                rs.send_manager(ManagerMsg::CheckNewState);
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
