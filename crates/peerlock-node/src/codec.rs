//! Frame I/O over async byte streams.

use std::io;

use bytes::BytesMut;
use peerlock_proto::{Frame, FrameHeader};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::NodeError;

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream before a header starts.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, NodeError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; FrameHeader::SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    // Validates magic, version and the payload limit before we allocate.
    let header = *FrameHeader::from_bytes(&header_buf)?;

    let mut payload = BytesMut::zeroed(header.payload_size());
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame::new(header, payload.freeze())))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), NodeError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
