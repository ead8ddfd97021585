//! The replica-set coordinator and its collaborators.
//!
//! Per-node state machine: joins a named set of peers, shares a versioned
//! configuration, polls each peer's health, exchanges heartbeats, and
//! drives primary selection and role transitions.

pub mod config;
pub mod coordinator;
pub mod heartbeat;
pub mod initiate;
pub mod member;
pub mod storage;

pub use config::{parse_repl_set_arg, MemberCfg, ReplSeedList, ReplSetConfig};
pub use coordinator::{ManagerMsg, MemberSummary, ReplDeps, ReplSet, StartupStatus};
pub use heartbeat::{handle_heartbeat, ReplTransport, TransportError};
pub use initiate::{check_all_members_up_for_config_change, initiate, reconfig};
pub use member::{HeartbeatInfo, Member};
pub use storage::{
    ConfigStore, FileConfigStore, MemoryConfigStore, MemoryOplog, OplogStore, StoreError,
};

// ---------------------------------------------------------------------------
// Test support: an in-process network of nodes
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------
