//! Wire-facing message schemas.
//!
//! All payload types use named MsgPack serialization
//! (`rmp_serde::to_vec_named()`) with camelCase field names.
//!
//! - [`wire`]: the length-prefixed message protocol (header, opcodes,
//!   replies, kill-cursors)
//! - [`repl`]: the replica-set heartbeat RPC and configuration document

pub mod repl;
pub mod wire;

pub use repl::{
    HeartbeatRequest, HeartbeatResponse, MemberConfigDoc, MemberState, ReplSetConfigDoc,
    REPL_PROTOCOL_VERSION,
};
pub use wire::{
    reply_flags, KillCursors, MsgHeader, OpCode, Reply, ReplyBody, WireError, HEADER_LEN,
    MAX_MESSAGE_LEN,
};
