//! The server's table of live connections.
//!
//! Written by the accept loop (insert) and by each connection's task
//! (remove on exit); read by the dispatcher on every broadcast. All access
//! goes through one `Mutex`.
//!
//! The table never holds sockets. Each entry is a [`Peer`]: the sending
//! half of that connection's bounded outbound queue, drained by its own
//! writer. Queuing never waits, so a peer that stops reading can only
//! fill its own queue, and is evicted when it does.

use std::collections::HashMap;
use std::sync::Arc;

use mcp_relay_transport::{ConnectionId, TransportError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};

/// One encoded frame, shared by every queue it is broadcast to.
pub(crate) type Frame = Arc<[u8]>;

/// The dispatcher-facing side of one connection.
#[derive(Clone)]
pub(crate) struct Peer {
    id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
    evicted: Arc<Notify>,
}

impl Peer {
    /// Creates a peer and the receiving end of its outbound queue.
    pub(crate) fn new(
        id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let peer = Self {
            id,
            outbound,
            evicted: Arc::new(Notify::new()),
        };
        (peer, rx)
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `frame` without waiting.
    ///
    /// A full queue evicts the peer: [`evicted`](Self::evicted) fires and
    /// the connection's task closes it.
    pub(crate) fn try_send(&self, frame: Frame) -> Result<(), TransportError> {
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.evicted.notify_one();
                Err(TransportError::OutboundFull {
                    capacity: self.outbound.max_capacity(),
                })
            }
            Err(TrySendError::Closed(_)) => Err(
                TransportError::ConnectionClosed("writer stopped".into()),
            ),
        }
    }

    /// Resolves once the peer has been evicted for falling behind.
    pub(crate) async fn evicted(&self) {
        self.evicted.notified().await;
    }
}

struct Inner {
    peers: HashMap<ConnectionId, Peer>,
    /// Set by [`ConnectionRegistry::close`]; later inserts are refused.
    closed: bool,
}

/// Live connections keyed by [`ConnectionId`].
///
/// The server exclusively owns every registered handle; nothing outside
/// the server gets a reference to the table.
pub(crate) struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                peers: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Registers a connection. Returns `false` once the registry has been
    /// closed for shutdown.
    pub(crate) async fn insert(&self, peer: Peer) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return false;
        }
        inner.peers.insert(peer.id(), peer);
        true
    }

    /// Deregisters a connection. Removing an unknown id is a no-op.
    pub(crate) async fn remove(&self, id: ConnectionId) -> Option<Peer> {
        self.inner.lock().await.peers.remove(&id)
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.peers.len()
    }

    /// Refuses further inserts and forgets every registered peer.
    /// Returns how many there were.
    pub(crate) async fn close(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.peers.drain().count()
    }

    /// Queues `frame` for every registered connection except `skip`.
    ///
    /// Never waits on a socket. A peer whose queue is full is evicted and
    /// skipped; delivery to the rest carries on. Returns the number of
    /// queues the frame was placed on.
    pub(crate) async fn broadcast(
        &self,
        frame: &[u8],
        skip: Option<ConnectionId>,
    ) -> usize {
        let frame: Frame = Arc::from(frame);
        let inner = self.inner.lock().await;
        let mut delivered = 0;
        for peer in inner.peers.values() {
            let conn_id = peer.id();
            if skip == Some(conn_id) {
                continue;
            }
            match peer.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "broadcast delivery failed");
                }
            }
        }
        delivered
    }
}
