//! Length-prefixed framing over async byte streams
//!
//! The brick's transports (USB HID, Bluetooth serial, TCP) all deliver the
//! same frames; these helpers work over anything implementing tokio's
//! `AsyncRead` / `AsyncWrite`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use brick_core::prelude::*;

use crate::message::{DeviceMessage, LENGTH_PREFIX_LEN};

/// Write one already-encoded frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frame.len() < LENGTH_PREFIX_LEN {
        return Err(Error::malformed("frame is shorter than its length prefix"));
    }
    writer
        .write_all(frame)
        .await
        .map_err(|e| Error::transport(format!("Failed to write frame: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::transport(format!("Failed to flush frame: {}", e)))?;
    Ok(())
}

/// Read one frame body (the bytes after the length prefix).
///
/// Returns `Ok(None)` on a clean end of stream before any byte of a new frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let first = reader
        .read(&mut prefix[..1])
        .await
        .map_err(|e| Error::transport(format!("Failed to read frame length: {}", e)))?;
    if first == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut prefix[1..])
        .await
        .map_err(|e| read_error("length prefix", LENGTH_PREFIX_LEN, e))?;

    let len = u16::from_le_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| read_error("frame body", len, e))?;

    trace!("Read frame body of {} bytes", len);
    Ok(Some(body))
}

/// A stream that ends partway through a frame is malformed; other failures
/// belong to the transport
fn read_error(part: &str, expected: usize, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::malformed(format!("stream ended inside a {} of {} bytes", part, expected))
    } else {
        Error::transport(format!("Failed to read {}: {}", part, e))
    }
}

/// Read and decode the next mailbox message.
///
/// A frame that arrives intact but fails to decode is reported as
/// [`Error::MalformedMessage`]; the stream stays usable for the next frame.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<DeviceMessage>>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(body) => DeviceMessage::decode(&body).map(Some),
        None => Ok(None),
    }
}
