//! Framing for the length-prefixed wire protocol.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use drove_core::messages::{MsgHeader, OpCode, WireError, HEADER_LEN};

/// One decoded message: the header plus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: MsgHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame, computing the header length field.
    ///
    /// # Panics
    ///
    /// Panics when the payload exceeds the wire's maximum message size.
    #[must_use]
    pub fn new(id: i32, response_to: i32, op_code: OpCode, payload: Vec<u8>) -> Self {
        let len = i32::try_from(HEADER_LEN + payload.len())
            .expect("payload within wire message bounds");
        Self {
            header: MsgHeader {
                len,
                id,
                response_to,
                op_code,
            },
            payload,
        }
    }
}

/// Codec errors: transport failures or malformed frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// tokio-util codec for the shared message header framing.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let header = MsgHeader::decode(&src[..HEADER_LEN])?;
        #[allow(clippy::cast_sign_loss)]
        let total = header.len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(total);
        frame.advance(HEADER_LEN);
        Ok(Some(Frame {
            header,
            payload: frame.to_vec(),
        }))
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_slice(&frame.header.encode());
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_the_codec() {
        let frame = Frame::new(7, 0, OpCode::Query, b"payload bytes".to_vec());
        let mut codec = WireCodec;
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let frame = Frame::new(1, 0, OpCode::Insert, vec![9; 100]);
        let mut codec = WireCodec;
        let mut wire = BytesMut::new();
        codec.encode(frame.clone(), &mut wire).unwrap();

        let mut buf = BytesMut::new();
        // Feed the header minus one byte: nothing decodes.
        buf.extend_from_slice(&wire[..HEADER_LEN - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Full header but short payload: still nothing.
        buf.extend_from_slice(&wire[HEADER_LEN - 1..HEADER_LEN + 10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[HEADER_LEN + 10..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn two_frames_in_one_buffer_decode_in_order() {
        let a = Frame::new(1, 0, OpCode::Query, b"a".to_vec());
        let b = Frame::new(2, 0, OpCode::KillCursors, b"bb".to_vec());
        let mut codec = WireCodec;
        let mut buf = BytesMut::new();
        codec.encode(a.clone(), &mut buf).unwrap();
        codec.encode(b.clone(), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), a);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_opcode_is_a_codec_error() {
        let frame = Frame::new(1, 0, OpCode::Query, vec![]);
        let mut codec = WireCodec;
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf[12..16].copy_from_slice(&12345_i32.to_le_bytes());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::Wire(WireError::UnknownOpCode(12345)))
        ));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let frame = Frame::new(1, 0, OpCode::Query, vec![]);
        let mut codec = WireCodec;
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf[0..4].copy_from_slice(&i32::MAX.to_le_bytes());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::Wire(WireError::BadLength(_)))
        ));
    }
}
