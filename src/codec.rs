//! Binary frame codec
//!
//! Every request and reply travels as one self-delimiting frame:
//!
//! ```text
//! +----------------------+-----------+---------------------+
//! | payload length (u32) | opcode u8 | payload (UTF-8)     |
//! | big-endian, 4 bytes  | 1 byte    | `length` bytes      |
//! +----------------------+-----------+---------------------+
//! ```
//!
//! The same layout is used in both directions. Requests carry an operation
//! code, replies carry a [`ReplyKind`](crate::message::ReplyKind) status.
//!
//! [`encode_frame`] and [`decode_frame`] are the pure transforms; [`FrameCodec`]
//! adapts them to `tokio_util::codec` for use with `Framed`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// Length prefix + opcode
pub const HEADER_LEN: usize = 5;

/// Default upper bound on a decoded payload (1 MiB)
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: String,
}

impl Frame {
    pub fn new(opcode: u8, payload: impl Into<String>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }
}

/// Encode a frame into a fresh buffer
pub fn encode_frame(frame: &Frame) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + frame.payload.len());
    write_frame(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode exactly one frame from `buf`
///
/// The buffer must hold the header and exactly the declared number of
/// payload bytes, nothing more.
pub fn decode_frame(buf: &[u8]) -> Result<Frame, FrameError> {
    if buf.len() < HEADER_LEN {
        return Err(FrameError::Truncated {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let mut header = &buf[..HEADER_LEN];
    let declared = header.get_u32() as usize;
    let opcode = header.get_u8();

    let body = &buf[HEADER_LEN..];
    if body.len() < declared {
        return Err(FrameError::Truncated {
            needed: HEADER_LEN + declared,
            available: buf.len(),
        });
    }
    if body.len() > declared {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }

    let payload = String::from_utf8(body.to_vec())?;
    Ok(Frame { opcode, payload })
}

fn write_frame(frame: &Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
    let len = frame.payload.len();
    let declared = u32::try_from(len).map_err(|_| FrameError::TooLarge {
        len,
        max: u32::MAX as usize,
    })?;

    dst.reserve(HEADER_LEN + len);
    dst.put_u32(declared);
    dst.put_u8(frame.opcode);
    dst.extend_from_slice(frame.payload.as_bytes());
    Ok(())
}

/// Streaming codec for `Framed` transports
///
/// Declared lengths above `max_payload` are rejected as soon as the header
/// arrives, before any payload is buffered.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > self.max_payload {
            return Err(FrameError::TooLarge {
                len: declared,
                max: self.max_payload,
            });
        }

        let total = HEADER_LEN + declared;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let packet = src.split_to(total);
        decode_frame(&packet).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        write_frame(&item, dst)
    }
}
