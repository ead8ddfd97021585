//! Wire protocol: length-prefixed messages with a shared header.
//!
//! Every message starts with `{len, id, response_to, op_code}` as four
//! little-endian `i32`s; `len` counts the whole message including the
//! header. Reply payloads carry either result documents or a typed error,
//! never an in-band error document.

use serde::{Deserialize, Serialize};

use crate::value::Document;

/// Bytes in the fixed message header.
pub const HEADER_LEN: usize = 16;

/// Largest accepted message, header included.
pub const MAX_MESSAGE_LEN: usize = 48 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Header / opcodes
// ---------------------------------------------------------------------------

/// Operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    Reply,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
}

impl OpCode {
    /// Wire value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
        }
    }

    #[must_use]
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(OpCode::Reply),
            2001 => Some(OpCode::Update),
            2002 => Some(OpCode::Insert),
            2004 => Some(OpCode::Query),
            2005 => Some(OpCode::GetMore),
            2006 => Some(OpCode::Delete),
            2007 => Some(OpCode::KillCursors),
            _ => None,
        }
    }

    /// `true` for ops the client expects a reply to.
    #[must_use]
    pub fn expects_response(self) -> bool {
        matches!(self, OpCode::Query | OpCode::GetMore)
    }

    /// `true` for fire-and-forget write ops.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, OpCode::Update | OpCode::Insert | OpCode::Delete)
    }
}

/// The shared message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total message length, header included.
    pub len: i32,
    pub id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

/// Errors decoding wire structures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("message header truncated")]
    TruncatedHeader,
    #[error("bad message length {0}")]
    BadLength(i32),
    #[error("unknown op code {0}")]
    UnknownOpCode(i32),
    #[error("bad kill-cursors payload: {0}")]
    BadKillCursors(String),
}

impl MsgHeader {
    /// Decodes a header from the first [`HEADER_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] on truncation, an out-of-range length, or an
    /// unknown op code.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::TruncatedHeader);
        }
        let read = |i: usize| i32::from_le_bytes(buf[i..i + 4].try_into().expect("4 bytes"));
        let len = read(0);
        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        if len < HEADER_LEN as i32 || len as usize > MAX_MESSAGE_LEN {
            return Err(WireError::BadLength(len));
        }
        let op = read(12);
        Ok(Self {
            len,
            id: read(4),
            response_to: read(8),
            op_code: OpCode::from_i32(op).ok_or(WireError::UnknownOpCode(op))?,
        })
    }

    /// Encodes the header into its 16-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0_u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.len.to_le_bytes());
        out[4..8].copy_from_slice(&self.id.to_le_bytes());
        out[8..12].copy_from_slice(&self.response_to.to_le_bytes());
        out[12..16].copy_from_slice(&self.op_code.as_i32().to_le_bytes());
        out
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Reply flag bits.
pub mod reply_flags {
    /// The requested cursor id was not found.
    pub const CURSOR_NOT_FOUND: u32 = 1;
    /// The reply body is an error, not result documents.
    pub const ERR_SET: u32 = 2;
    /// The client's routing table is stale; it must refresh before
    /// retrying.
    pub const SHARD_CONFIG_STALE: u32 = 4;
}

/// The body of a reply: results or a typed error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplyBody {
    Documents(Vec<Document>),
    Error { code: Option<i32>, message: String },
}

/// A reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub flags: u32,
    /// Zero when the cursor is exhausted.
    pub cursor_id: u64,
    /// Offset of the first returned document in the overall result stream.
    pub starting_from: i32,
    pub body: ReplyBody,
}

impl Reply {
    /// A successful batch.
    #[must_use]
    pub fn documents(cursor_id: u64, starting_from: i32, docs: Vec<Document>) -> Self {
        Self {
            flags: 0,
            cursor_id,
            starting_from,
            body: ReplyBody::Documents(docs),
        }
    }

    /// An error reply; sets [`reply_flags::ERR_SET`].
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            flags: reply_flags::ERR_SET,
            cursor_id: 0,
            starting_from: 0,
            body: ReplyBody::Error {
                code: None,
                message: message.into(),
            },
        }
    }

    /// A stale-shard-config error reply; the router must refresh its
    /// routing table.
    #[must_use]
    pub fn stale_config(message: impl Into<String>) -> Self {
        let mut reply = Self::error(message);
        reply.flags |= reply_flags::SHARD_CONFIG_STALE;
        reply
    }

    /// Number of documents carried (zero for errors).
    #[must_use]
    pub fn n_returned(&self) -> usize {
        match &self.body {
            ReplyBody::Documents(docs) => docs.len(),
            ReplyBody::Error { .. } => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Kill-cursors
// ---------------------------------------------------------------------------

/// Payload of a kill-cursors message: `int32 reserved; int32 n;
/// int64 ids[n]`, with `n` in `[1, 10000)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillCursors {
    pub ids: Vec<u64>,
}

impl KillCursors {
    /// Decodes the payload (the bytes after the header).
    ///
    /// # Errors
    ///
    /// Returns [`WireError::BadKillCursors`] on truncation or an
    /// out-of-range count.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < 8 {
            return Err(WireError::BadKillCursors("payload truncated".to_string()));
        }
        let n = i32::from_le_bytes(payload[4..8].try_into().expect("4 bytes"));
        if n < 1 {
            return Err(WireError::BadKillCursors("sent 0 cursors to kill".to_string()));
        }
        if n >= 10_000 {
            return Err(WireError::BadKillCursors("too many cursors to kill".to_string()));
        }
        #[allow(clippy::cast_sign_loss)]
        let n = n as usize;
        if payload.len() < 8 + n * 8 {
            return Err(WireError::BadKillCursors("id list truncated".to_string()));
        }
        let ids = (0..n)
            .map(|i| {
                let at = 8 + i * 8;
                u64::from_le_bytes(payload[at..at + 8].try_into().expect("8 bytes"))
            })
            .collect();
        Ok(Self { ids })
    }

    /// Encodes the payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.ids.len() * 8);
        out.extend_from_slice(&0_i32.to_le_bytes());
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        out.extend_from_slice(&(self.ids.len() as i32).to_le_bytes());
        for id in &self.ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
