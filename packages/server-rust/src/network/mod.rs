//! Wire transport plumbing.

pub mod codec;

pub use codec::{CodecError, Frame, WireCodec};
