//! Length-prefixed framing.
//!
//! A frame is a 4-byte unsigned big-endian length `N` followed by `N`
//! payload bytes. Readers refuse frames above [`MAX_FRAME_BYTES`]; any
//! read or write error, including a clean EOF mid-frame, is fatal for
//! the connection and surfaces as an error to the caller.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Message, Result, WireError};

/// Maximum accepted frame payload size (16 MiB).
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Reads one frame payload from the stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_BYTES {
        return Err(WireError::OversizeFrame {
            len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes one frame to the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    debug_assert!(payload.len() <= MAX_FRAME_BYTES);
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads and decodes one message.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    let payload = read_frame(reader).await?;
    Message::decode(&payload)
}

/// Encodes and writes one message.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<()> {
    let payload = message.encode()?;
    write_frame(writer, &payload).await
}
