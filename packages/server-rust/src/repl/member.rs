//! Replica-set member records and heartbeat bookkeeping.

use drove_core::messages::MemberState;
use drove_core::{Endpoint, OpTime};

use super::config::MemberCfg;

// ---------------------------------------------------------------------------
// HeartbeatInfo
// ---------------------------------------------------------------------------

/// What the health poller knows about one peer. Copyable snapshot state:
/// pollers build a new one each round and message it to the manager.
///
/// Invariant: `health == 1` exactly when `up_since > 0`; `up_since` is
/// monotonic within an up-streak and reset to zero on each down
/// transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatInfo {
    pub id: u32,
    pub state: MemberState,
    /// `-1` unknown (never reached), `0` down, `1` up.
    pub health: i8,
    /// Epoch seconds of the first successful heartbeat of the current
    /// up-streak; zero while down.
    pub up_since: u64,
    /// Epoch seconds of the last response, success or not.
    pub last_heartbeat: u64,
    pub last_heartbeat_msg: String,
    /// The peer's last-written op-time, as reported by it.
    pub op_time: OpTime,
}

impl HeartbeatInfo {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: MemberState::Unknown,
            health: -1,
            up_since: 0,
            last_heartbeat: 0,
            last_heartbeat_msg: String::new(),
            op_time: OpTime::default(),
        }
    }

    #[must_use]
    pub fn up(&self) -> bool {
        self.health > 0
    }

    /// `true` when the observable `(health, state)` pair moved; the
    /// trigger for waking the manager early.
    #[must_use]
    pub fn changed(&self, old: &HeartbeatInfo) -> bool {
        self.health != old.health || self.state != old.state
    }

    /// Records a successful heartbeat at `now`.
    pub fn mark_up(&mut self, now: u64, state: MemberState, op_time: Option<OpTime>) {
        self.last_heartbeat = now;
        self.state = state;
        if self.up_since == 0 {
            self.up_since = now;
        }
        self.health = 1;
        self.last_heartbeat_msg.clear();
        if let Some(t) = op_time {
            self.op_time = t;
        }
    }

    /// Records a failed heartbeat.
    pub fn mark_down(&mut self, now: u64, msg: &str) {
        self.last_heartbeat = now;
        self.health = 0;
        self.up_since = 0;
        self.state = MemberState::Unknown;
        self.last_heartbeat_msg = msg.to_string();
    }
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// One peer in the set: its configuration entry plus live heartbeat state.
#[derive(Debug, Clone)]
pub struct Member {
    pub cfg: MemberCfg,
    pub hb: HeartbeatInfo,
}

impl Member {
    #[must_use]
    pub fn new(cfg: MemberCfg) -> Self {
        let hb = HeartbeatInfo::new(cfg.id);
        Self { cfg, hb }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.cfg.id
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.cfg.host
    }

    /// Eligible to hold the primary role.
    #[must_use]
    pub fn potentially_hot(&self) -> bool {
        self.cfg.potentially_hot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
