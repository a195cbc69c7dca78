//! # Single-Shot Transport
//!
//! One message, one TCP connection. The sender connects, writes the JSON
//! document, half-closes its write side, and — for request/reply
//! exchanges — reads the single reply before the receiver closes. The
//! half-close lets the receiver read to EOF instead of guessing at
//! message boundaries; the 8 KiB cap bounds what it will buffer.
//!
//! Every connect, write, and read is individually capped at
//! [`IO_TIMEOUT`](crate::config::IO_TIMEOUT). Failures at this layer are
//! swallowed by design: gossip and the membership consensus both tolerate
//! loss, so a refused connection or a timeout degrades into a dropped
//! message, logged at debug and nothing more.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{IO_TIMEOUT, MAX_FRAME_BYTES};
use crate::identity::NodeId;
use crate::network::message::{Message, Reply};

/// Errors internal to the transport layer. The public API never surfaces
/// these — they exist for logging and for the receive path in the node
/// runtimes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket-level failure (connect refused, reset, ...).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The 2-second wall-clock cap elapsed.
    #[error("timed out")]
    Timeout,
    /// The payload failed to encode or the reply failed to decode.
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    /// The remote closed without writing a reply.
    #[error("empty reply")]
    EmptyReply,
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}

/// Fire-and-forget send. Returns whether the payload was handed to the
/// remote; failures are logged at debug and swallowed.
pub async fn send(target: &NodeId, msg: &Message) -> bool {
    match try_send(target, msg).await {
        Ok(()) => true,
        Err(e) => {
            debug!(target = %target, error = %e, "send dropped");
            false
        }
    }
}

/// Request/reply exchange. Returns `None` on any failure — connect, I/O,
/// timeout, or an undecodable reply.
pub async fn request(target: &NodeId, msg: &Message) -> Option<Reply> {
    match try_request(target, msg).await {
        Ok(reply) => Some(reply),
        Err(e) => {
            debug!(target = %target, error = %e, "request dropped");
            None
        }
    }
}

async fn connect_and_write(target: &NodeId, msg: &Message) -> Result<TcpStream, TransportError> {
    let payload = serde_json::to_vec(msg)?;
    let mut stream =
        timeout(IO_TIMEOUT, TcpStream::connect((target.ip.as_str(), target.port))).await??;
    timeout(IO_TIMEOUT, stream.write_all(&payload)).await??;
    // Half-close: signals end-of-message so the receiver's read-to-EOF
    // terminates, while leaving the read side open for a reply.
    timeout(IO_TIMEOUT, stream.shutdown()).await??;
    Ok(stream)
}

async fn try_send(target: &NodeId, msg: &Message) -> Result<(), TransportError> {
    connect_and_write(target, msg).await?;
    Ok(())
}

async fn try_request(target: &NodeId, msg: &Message) -> Result<Reply, TransportError> {
    let mut stream = connect_and_write(target, msg).await?;
    let raw = read_frame(&mut stream).await?;
    if raw.is_empty() {
        return Err(TransportError::EmptyReply);
    }
    Ok(serde_json::from_slice(&raw)?)
}

/// Reads one frame: everything until EOF, capped at
/// [`MAX_FRAME_BYTES`](crate::config::MAX_FRAME_BYTES), within the I/O
/// timeout. Shared by the client reply path and the server accept path.
pub(crate) async fn read_frame<R>(stream: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    timeout(
        IO_TIMEOUT,
        stream.take(MAX_FRAME_BYTES as u64).read_to_end(&mut buf),
    )
    .await??;
    Ok(buf)
}
