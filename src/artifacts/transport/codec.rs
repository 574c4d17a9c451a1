//! Message framing
//!
//! ```text
//! [4 bytes big-endian payload length][bincode payload]
//! ```

use crate::artifacts::transport::message::{MAX_MESSAGE_SIZE, Message};
use crate::errors::{Result, VcsError};
use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_SIZE: usize = 4;

pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let payload = bincode::serialize(message)
        .map_err(|e| VcsError::Network(format!("cannot encode {}: {e}", message.type_name())))?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(VcsError::Network(format!(
            "{} frame of {} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit",
            message.type_name(),
            payload.len()
        )));
    }

    let mut frame = vec![0u8; HEADER_SIZE];
    BigEndian::write_u32(&mut frame, payload.len() as u32);
    frame.extend_from_slice(&payload);

    Ok(frame)
}

pub fn decode(payload: &[u8]) -> Result<Message> {
    bincode::deserialize(payload).map_err(|e| VcsError::Network(format!("malformed frame: {e}")))
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await.map_err(network)?;
    writer.flush().await.map_err(network)?;

    tracing::trace!(message = message.type_name(), bytes = frame.len(), "sent frame");
    Ok(())
}

/// Next message, or `None` when the peer closed the connection between frames.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(network(e)),
    }

    let length = BigEndian::read_u32(&header) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(VcsError::Network(format!(
            "incoming frame of {length} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(network)?;

    let message = decode(&payload)?;
    tracing::trace!(message = message.type_name(), bytes = length, "received frame");

    Ok(Some(message))
}

fn network(error: std::io::Error) -> VcsError {
    VcsError::Network(format!("connection error: {error}"))
}
