//! Replica-set wire documents: the heartbeat RPC and the stored
//! configuration document.

use serde::{Deserialize, Serialize};

use crate::optime::OpTime;

/// The replica-set heartbeat protocol version. Anything else is rejected
/// with `incompatible replset protocol version`.
pub const REPL_PROTOCOL_VERSION: i32 = 1;

// ---------------------------------------------------------------------------
// Member state
// ---------------------------------------------------------------------------

/// A replica-set member's role state.
///
/// `Startup` is the boot state; `Startup2` follows once a configuration is
/// loaded. `Fatal` is absorbing. `Unknown` is reserved for peers not yet
/// reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberState {
    Startup,
    Primary,
    Secondary,
    Recovering,
    Fatal,
    Startup2,
    Unknown,
}

impl MemberState {
    /// `true` for states that participate in replication.
    #[must_use]
    pub fn readable(self) -> bool {
        matches!(self, MemberState::Primary | MemberState::Secondary)
    }
}

// ---------------------------------------------------------------------------
// Heartbeat RPC
// ---------------------------------------------------------------------------

/// `{replSetHeartbeat: <set>, v, pv, checkEmpty}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub set_name: String,
    /// The caller's configuration version; the responder attaches its own
    /// configuration when it has a newer one.
    pub config_version: i64,
    pub protocol_version: i32,
    /// Ask whether the responder holds any user data (initiate probing).
    pub check_empty: bool,
}

/// The heartbeat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub errmsg: Option<String>,
    /// `true` when the responder runs with a replica set configured at all.
    pub rs: bool,
    /// Set when the set names (or protocol) do not line up.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub set: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub state: Option<MemberState>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub op_time: Option<OpTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub config_version: Option<i64>,
    /// Attached when the responder's configuration is newer than the
    /// caller's.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub config: Option<ReplSetConfigDoc>,
    /// Present only for `check_empty` probes.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub has_data: Option<bool>,
}

impl HeartbeatResponse {
    /// An error response carrying only a message.
    #[must_use]
    pub fn error(errmsg: impl Into<String>) -> Self {
        Self {
            ok: false,
            errmsg: Some(errmsg.into()),
            rs: false,
            mismatch: false,
            set: None,
            state: None,
            op_time: None,
            config_version: None,
            config: None,
            has_data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration document
// ---------------------------------------------------------------------------

/// One member entry in the stored configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberConfigDoc {
    #[serde(rename = "_id")]
    pub id: u32,
    /// `host[:port]`.
    pub host: String,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub arbiter_only: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub priority: Option<f64>,
}

/// The stored replica-set configuration document
/// `{_id: <set>, version, members[]}`. Versions are totally ordered; the
/// highest version wins, ties broken in favor of the local copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplSetConfigDoc {
    #[serde(rename = "_id")]
    pub set_id: String,
    pub version: i64,
    pub members: Vec<MemberConfigDoc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
