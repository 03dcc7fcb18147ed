//! Frame envelope and stream splitting codec.
//!
//! ```text
//! [flags(4) | len_hi(4)] [len_lo(16, BE)] [body(len)]
//! ```
//!
//! The header is never encrypted; flag `0x8` marks a ciphertext body.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Header length in bytes
pub const HEADER_LEN: usize = 3;

/// Largest body a 20-bit length can describe
pub const MAX_FRAME_SIZE: usize = 0xF_FFFF;

/// Flag marking an encrypted body
pub const FLAG_ENCRYPTED: u8 = 0x8;

/// One wire-level unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub encrypted: bool,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn plain(body: Vec<u8>) -> Self {
        Self {
            encrypted: false,
            body,
        }
    }

    pub fn encrypted(body: Vec<u8>) -> Self {
        Self {
            encrypted: true,
            body,
        }
    }

    /// Serialize header and body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        FrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Parse a complete frame from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = BytesMut::from(bytes);
        FrameCodec
            .decode(&mut buf)?
            .ok_or_else(|| ProtocolError::MalformedFrame("incomplete frame".into()))
    }
}

/// Parsed header: flags and body length.
pub(crate) fn parse_header(src: &[u8]) -> Option<(u8, usize)> {
    if src.len() < HEADER_LEN {
        return None;
    }
    let flags = src[0] >> 4;
    let len = (usize::from(src[0] & 0x0F) << 16) | (usize::from(src[1]) << 8) | usize::from(src[2]);
    Some((flags, len))
}

/// Splits a byte stream into frames. Stateless; an incomplete frame leaves the
/// buffer untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some((flags, len)) = parse_header(src) else {
            return Ok(None);
        };

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(len).to_vec();

        Ok(Some(Frame {
            encrypted: flags & FLAG_ENCRYPTED != 0,
            body,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let len = frame.body.len();
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::OversizedFrame(len));
        }

        let flags = if frame.encrypted { FLAG_ENCRYPTED } else { 0 };
        dst.reserve(HEADER_LEN + len);
        dst.put_u8((flags << 4) | ((len >> 16) as u8 & 0x0F));
        dst.put_u16(len as u16);
        dst.extend_from_slice(&frame.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = Frame::encrypted(vec![0xAA; 0x1_0203]).to_bytes().unwrap();
        assert_eq!(&bytes[..3], &[0x81, 0x02, 0x03]);
        assert_eq!(bytes.len(), 3 + 0x1_0203);
    }

    #[test]
    fn test_incomplete_leaves_buffer() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x05, 1, 2][..]);
        assert!(FrameCodec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_oversized_rejected() {
        let mut buf = BytesMut::new();
        let err = FrameCodec
            .encode(Frame::plain(vec![0; MAX_FRAME_SIZE + 1]), &mut buf)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedFrame(_)));
        assert!(buf.is_empty());
    }
}
