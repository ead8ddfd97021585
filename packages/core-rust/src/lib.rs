//! Drove core — document values, endpoint identity, query range analysis,
//! and wire message schemas.
//!
//! This crate is the I/O-free foundation of the Drove distributed document
//! database:
//!
//! - **Values** ([`value`]): the `Value` enum with a total cross-type order,
//!   and `Document`
//! - **Endpoints** ([`endpoint`]): `host[:port]` parsing and self-identity
//! - **Op-times** ([`optime`]): totally ordered op-log positions
//! - **Chunk versions** ([`chunk`]): monotonic per-namespace version tags
//! - **Query analysis** ([`query`]): predicate parsing, per-field value
//!   ranges, `$or` peeling, query patterns, and index-scan bounds
//! - **Messages** ([`messages`]): the wire protocol and replica-set RPC
//!   document schemas

pub mod chunk;
pub mod endpoint;
pub mod messages;
pub mod optime;
pub mod query;
pub mod value;

// Values
pub use value::{doc_from_json, doc_to_json, Document, DocumentExt, Value};

// Endpoints
pub use endpoint::{same_hostname, Endpoint, EndpointParseError, ProcessIdentity, DEFAULT_PORT};

// Op-time / chunk version
pub use chunk::ChunkVersion;
pub use optime::OpTime;

// Query analysis
pub use query::{
    BoundKind, BoundList, FieldRange, FieldRangeOrSet, FieldRangeSet, QueryError, QueryPattern,
};
