//! Per-connection reader and writer.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`] and [`write_loop`] side by side. The reader:
//!   1. Reads one frame (or observes shutdown / idle timeout)
//!   2. Decodes it as a `Message`; a bad payload is logged and skipped
//!   3. Stamps receipt time and origin, pushes onto the inbound queue
//!   4. Queues an `Ack` for the same connection
//!
//! The writer is the only code that writes to the socket. It drains the
//! connection's outbound queue, and a write that stalls past the write
//! timeout ends the connection.

use std::time::Duration;

use mcp_relay_protocol::{timestamp, Ack, Codec, Message};
use mcp_relay_transport::{Connection, TcpConnection, TransportError};
use tokio::sync::{mpsc, watch};

use crate::dispatcher::Inbound;
use crate::registry::{Frame, Peer};
use crate::server::{shutdown_requested, ServerState};
use crate::RelayError;

/// Why a receive loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// The peer closed its side of the stream.
    PeerClosed,
    /// The server is stopping.
    Shutdown,
}

/// Reads from a single connection until it closes.
///
/// Registration and deregistration are done by the caller around this
/// function, so the connection is registered exactly while it runs.
pub(crate) async fn handle_connection<C: Codec>(
    conn: &TcpConnection,
    peer: &Peer,
    state: &ServerState<C>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<CloseReason, RelayError> {
    let conn_id = conn.id();
    let origin = conn.peer_addr().to_string();

    loop {
        let frame = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => return Ok(CloseReason::Shutdown),
            frame = recv_frame(conn, state.config.idle_timeout) => frame,
        };

        let data = match frame {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(CloseReason::PeerClosed),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(%conn_id, %origin, error = %e, "dropped oversized frame");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut message: Message = match state.codec.decode(&data) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(%conn_id, %origin, error = %e, "invalid message received");
                continue;
            }
        };
        message.timestamp = timestamp::now();
        message.origin = Some(origin.clone());
        tracing::debug!(%conn_id, kind = ?message.kind(), "message queued");

        if state.inbound.send(Inbound { conn_id, message }).is_err() {
            // Dispatcher is gone: the server is shutting down.
            return Ok(CloseReason::Shutdown);
        }

        let ack = state.codec.encode(&Ack::received())?;
        peer.try_send(Frame::from(ack))?;
    }
}

/// Writes queued frames to the socket, each bounded by `write_timeout`.
///
/// Returns once every sender is gone; a failed or stalled write is an
/// error.
pub(crate) async fn write_loop(
    conn: &TcpConnection,
    mut outbound: mpsc::Receiver<Frame>,
    write_timeout: Duration,
) -> Result<CloseReason, RelayError> {
    while let Some(frame) = outbound.recv().await {
        match tokio::time::timeout(write_timeout, conn.send(&frame)).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::WriteTimeout(write_timeout).into()),
        }
    }
    Ok(CloseReason::Shutdown)
}

/// Reads one frame, bounded by the idle timeout when one is configured.
async fn recv_frame(
    conn: &TcpConnection,
    idle_timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>, TransportError> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::IdleTimeout(limit)),
        },
        None => conn.recv().await,
    }
}
