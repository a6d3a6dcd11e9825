//! Length-prefixed framing over a byte stream.
//!
//! Every message travels as `[i32 big-endian total-length][payload]`.
//! These primitives do the framing only; interpreting the payload is
//! [`crate::wire`]'s job. One reader task per connection calls
//! [`read_frame`] in a loop; writers serialize access to the stream
//! themselves (a frame must never interleave with another).

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::ProtocolError;

/// Upper bound on a single frame payload. The largest legitimate frame
/// is a manifest for a full 127-node overlay, well under this.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Read one frame. Returns `Ok(None)` on clean EOF at a frame boundary;
/// EOF mid-frame is a truncation error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = i32::from_be_bytes(len_buf);
    if len < 0 {
        return Err(ProtocolError::BadLength(len));
    }
    let len = len as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::Truncated {
                needed: len,
                have: 0,
            }
        } else {
            e.into()
        }
    })?;

    Ok(Some(payload.into()))
}

/// Write one frame: length prefix plus payload, then flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_i32(payload.len() as i32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
