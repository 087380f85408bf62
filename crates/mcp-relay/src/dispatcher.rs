//! The single task that drains the inbound queue.
//!
//! Every connection's receive task pushes onto one unbounded FIFO and
//! this task is its only consumer, so messages from one connection are
//! dispatched in the order they arrived. A failure while handling one
//! message is logged and the loop moves on to the next.
//!
//! Journal appends run on the blocking pool and are awaited before the
//! broadcast, so journal order matches dispatch order. Broadcasts only
//! queue frames and never wait on a socket.

use std::sync::Arc;

use mcp_relay_journal::{ChatLabel, ChatRecord, JournalError, SystemRecord};
use mcp_relay_protocol::{Codec, Message, MessageBody};
use mcp_relay_transport::ConnectionId;
use tokio::sync::{mpsc, watch};

use crate::server::{shutdown_requested, ServerState};
use crate::RelayError;

/// A message waiting for dispatch, tagged with the connection it came in on.
#[derive(Debug)]
pub(crate) struct Inbound {
    pub(crate) conn_id: ConnectionId,
    pub(crate) message: Message,
}

/// Runs until shutdown is requested.
pub(crate) async fn run_dispatcher<C: Codec>(
    state: Arc<ServerState<C>>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("dispatcher started");
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break,
            next = inbound.recv() => next,
        };
        let Some(item) = next else { break };

        if let Err(e) = dispatch(&state, item).await {
            tracing::error!(error = %e, "error processing message");
        }
    }
    tracing::debug!("dispatcher stopped");
}

/// Routes one message by type.
pub(crate) async fn dispatch<C: Codec>(
    state: &ServerState<C>,
    inbound: Inbound,
) -> Result<(), RelayError> {
    let Inbound { conn_id, message } = inbound;
    let origin = message.origin.clone().unwrap_or_default();
    tracing::info!(%conn_id, %origin, kind = ?message.kind(), "processing message");

    match &message.body {
        MessageBody::Chat { .. } => handle_chat(state, conn_id, &origin, &message).await,
        MessageBody::System { .. } => handle_system(state, &origin, &message).await,
        MessageBody::Unknown => {
            tracing::warn!(%conn_id, %origin, "unrecognized message type, dropped");
            Ok(())
        }
    }
}

async fn handle_chat<C: Codec>(
    state: &ServerState<C>,
    conn_id: ConnectionId,
    origin: &str,
    message: &Message,
) -> Result<(), RelayError> {
    let record = ChatRecord {
        timestamp: message.timestamp.clone(),
        client: origin.to_string(),
        content: message.content.clone(),
        label: ChatLabel::from_is_user(message.is_user()),
    };
    let journal = Arc::clone(&state.chat_log);
    if let Err(e) = append_blocking(move || journal.append(&record)).await {
        tracing::error!(%conn_id, error = %e, "failed to append chat record");
    }

    let relayed = Message::chat_broadcast(
        origin,
        message.content.clone(),
        message.timestamp.clone(),
    );
    let frame = state.codec.encode(&relayed)?;
    let skip = (!state.config.echo_to_sender).then_some(conn_id);
    let delivered = state.registry.broadcast(&frame, skip).await;
    tracing::debug!(%conn_id, delivered, "chat broadcast");
    Ok(())
}

async fn handle_system<C: Codec>(
    state: &ServerState<C>,
    origin: &str,
    message: &Message,
) -> Result<(), RelayError> {
    let record = SystemRecord {
        timestamp: message.timestamp.clone(),
        client: origin.to_string(),
        content: message.content.clone(),
        command: message.command().map(str::to_string),
    };
    let journal = Arc::clone(&state.system_log);
    if let Err(e) = append_blocking(move || journal.append(&record)).await {
        tracing::error!(%origin, error = %e, "failed to append system record");
    }

    if message.is_broadcast_command() {
        let frame = state.codec.encode(message)?;
        let delivered = state.registry.broadcast(&frame, None).await;
        tracing::debug!(%origin, delivered, "system broadcast");
    }
    Ok(())
}

/// Runs one journal append on the blocking pool. File journals write
/// synchronously, which must not happen on a runtime worker.
async fn append_blocking<F>(append: F) -> Result<(), RelayError>
where
    F: FnOnce() -> Result<(), JournalError> + Send + 'static,
{
    match tokio::task::spawn_blocking(append).await {
        Ok(result) => Ok(result?),
        Err(e) => Err(JournalError::Io(std::io::Error::other(e)).into()),
    }
}
