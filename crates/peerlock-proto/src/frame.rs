//! Complete frames: header plus payload bytes.

use bytes::Bytes;

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// A decoded frame.
///
/// The header's payload size always matches `payload.len()` for frames built
/// through [`Frame::new`] or [`Frame::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Fixed header
    pub header: FrameHeader,
    /// CBOR-encoded payload
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame, stamping the payload size into the header.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        header.set_payload_size(payload.len() as u32);
        Self { header, payload }
    }

    /// Total encoded length.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append the wire encoding to `dst`.
    pub fn encode(&self, dst: &mut Vec<u8>) -> Result<()> {
        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE,
            });
        }
        if self.header.payload_size() != self.payload.len() {
            return Err(ProtocolError::PayloadSizeMismatch {
                declared: self.header.payload_size(),
                actual: self.payload.len(),
            });
        }

        dst.reserve(self.encoded_len());
        dst.extend_from_slice(&self.header.to_bytes());
        dst.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Decode exactly one frame from `bytes`.
    ///
    /// Bytes beyond the declared payload are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;
        let expected = FrameHeader::SIZE + header.payload_size();

        if bytes.len() < expected {
            return Err(ProtocolError::FrameTooShort { expected, actual: bytes.len() });
        }
        if bytes.len() > expected {
            return Err(ProtocolError::PayloadSizeMismatch {
                declared: header.payload_size(),
                actual: bytes.len() - FrameHeader::SIZE,
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..]);
        Ok(Self { header, payload })
    }
}
