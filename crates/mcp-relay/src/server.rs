//! `RelayServer` builder and server tasks.
//!
//! This is the entry point for running a relay. It ties together the
//! layers: transport → protocol → inbound queue → dispatcher → journals
//! and broadcast.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mcp_relay_journal::{
    FileJournal, Journal, NullJournal, CHAT_LOG_FILE, SYSTEM_LOG_FILE,
};
use mcp_relay_protocol::{Codec, JsonCodec, Message, DEFAULT_HOST, DEFAULT_PORT};
use mcp_relay_transport::{
    Connection, TcpConnection, TcpTransport, Transport, TransportError,
    DEFAULT_MAX_FRAME_LEN,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::dispatcher::{run_dispatcher, Inbound};
use crate::handler::{handle_connection, write_loop};
use crate::registry::{ConnectionRegistry, Peer};
use crate::RelayError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_OUTBOUND_QUEUE_LEN: usize = 256;

/// How long `stop()` waits for the accept loop and dispatcher.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tunables for a relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Default: `localhost:5555`.
    pub bind_addr: String,

    /// Close a connection that sends nothing for this long.
    /// Default: `None` (connections may idle indefinitely).
    pub idle_timeout: Option<Duration>,

    /// Largest accepted frame in bytes. Longer frames are dropped without
    /// closing the connection. Default: 64 KiB.
    pub max_frame_len: usize,

    /// Whether a chat broadcast is also written back to the connection
    /// that sent it. Default: `true`.
    pub echo_to_sender: bool,

    /// Longest a single write to a client may take before the connection
    /// is dropped. Default: 10 seconds.
    pub write_timeout: Duration,

    /// Frames that may wait to be written to one client. A client whose
    /// queue fills is dropped. Default: 256.
    pub outbound_queue_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            idle_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            echo_to_sender: true,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            outbound_queue_len: DEFAULT_OUTBOUND_QUEUE_LEN,
        }
    }
}

/// Shared server state passed to every task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) config: ServerConfig,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) inbound: mpsc::UnboundedSender<Inbound>,
    pub(crate) chat_log: Arc<dyn Journal>,
    pub(crate) system_log: Arc<dyn Journal>,
    pub(crate) codec: C,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a relay server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), mcp_relay::RelayError> {
/// use mcp_relay::RelayServer;
///
/// let server = RelayServer::builder()
///     .bind("127.0.0.1:5555")
///     .log_dir("logs")
///     .start()
///     .await?;
/// server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
/// # Ok(())
/// # }
/// ```
pub struct RelayServerBuilder {
    config: ServerConfig,
    log_dir: Option<PathBuf>,
    chat_log: Option<Arc<dyn Journal>>,
    system_log: Option<Arc<dyn Journal>>,
}

impl RelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            log_dir: None,
            chat_log: None,
            system_log: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the idle timeout for client connections.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Sets the largest accepted frame.
    pub fn max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.config.max_frame_len = max_frame_len;
        self
    }

    /// Chooses whether chat broadcasts go back to their sender.
    pub fn echo_to_sender(mut self, echo: bool) -> Self {
        self.config.echo_to_sender = echo;
        self
    }

    /// Sets how long one write to a client may stall.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Sets how many frames may queue for one client.
    pub fn outbound_queue_len(mut self, len: usize) -> Self {
        self.config.outbound_queue_len = len;
        self
    }

    /// Writes `chat_history.log` and `system.log` under `dir`, unless a
    /// journal was supplied explicitly.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Uses `journal` for chat records.
    pub fn chat_log(mut self, journal: Arc<dyn Journal>) -> Self {
        self.chat_log = Some(journal);
        self
    }

    /// Uses `journal` for system records.
    pub fn system_log(mut self, journal: Arc<dyn Journal>) -> Self {
        self.system_log = Some(journal);
        self
    }

    /// Binds the listener and spawns the accept loop and the dispatcher.
    ///
    /// Uses `JsonCodec` and `TcpTransport`.
    ///
    /// # Errors
    /// A bind failure ([`RelayError::is_bind_error`]) or a journal that
    /// cannot be opened. Nothing is left running on error.
    pub async fn start(self) -> Result<RelayServer<JsonCodec>, RelayError> {
        let chat_log = resolve_journal(self.chat_log, &self.log_dir, CHAT_LOG_FILE)?;
        let system_log =
            resolve_journal(self.system_log, &self.log_dir, SYSTEM_LOG_FILE)?;

        let addr = self.config.bind_addr.clone();
        let transport = TcpTransport::bind(&addr)
            .await?
            .with_max_frame_len(self.config.max_frame_len);
        let local_addr = transport
            .local_addr()
            .map_err(|source| TransportError::BindFailed { addr, source })?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = Arc::new(ServerState {
            config: self.config,
            registry: ConnectionRegistry::new(),
            inbound: inbound_tx,
            chat_log,
            system_log,
            codec: JsonCodec,
        });

        let accept = tokio::spawn(accept_loop(
            transport,
            Arc::clone(&state),
            shutdown_rx.clone(),
        ));
        let dispatcher = tokio::spawn(run_dispatcher(
            Arc::clone(&state),
            inbound_rx,
            shutdown_rx,
        ));

        tracing::info!(%local_addr, "MCP relay server started");

        Ok(RelayServer {
            state,
            local_addr,
            shutdown: shutdown_tx,
            tasks: Mutex::new(vec![accept, dispatcher]),
        })
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_journal(
    explicit: Option<Arc<dyn Journal>>,
    log_dir: &Option<PathBuf>,
    file_name: &str,
) -> Result<Arc<dyn Journal>, RelayError> {
    Ok(match (explicit, log_dir) {
        (Some(journal), _) => journal,
        (None, Some(dir)) => Arc::new(FileJournal::in_dir(dir, file_name)?),
        (None, None) => Arc::new(NullJournal),
    })
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// A running relay server.
///
/// The accept loop and dispatcher run as background tasks from the moment
/// [`RelayServerBuilder::start`] returns. Call [`stop()`](Self::stop) to
/// shut down; dropping the server also signals every task to exit.
pub struct RelayServer<C: Codec = JsonCodec> {
    state: Arc<ServerState<C>>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Binds `host:port` with default settings and starts serving.
    pub async fn start(host: &str, port: u16) -> Result<Self, RelayError> {
        RelayServerBuilder::new()
            .bind(&format!("{host}:{port}"))
            .start()
            .await
    }
}

impl<C: Codec> RelayServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.state.registry.len().await
    }

    /// Sends `message` to every registered connection.
    ///
    /// Returns how many connections it was queued for. A connection that
    /// has fallen too far behind is dropped instead; the rest still get
    /// the message.
    pub async fn broadcast(&self, message: &Message) -> Result<usize, RelayError> {
        let frame = self.state.codec.encode(message)?;
        Ok(self.state.registry.broadcast(&frame, None).await)
    }

    /// Whether [`stop()`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stops the server.
    ///
    /// Signals every task, deregisters every connection (each
    /// connection's task then closes its socket), and waits up to a few
    /// seconds for the accept loop, which owns the listening socket, and
    /// the dispatcher to finish. Calling it again is a no-op.
    pub async fn stop(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        tracing::info!("MCP relay server stopping");

        let closed = self.state.registry.close().await;
        tracing::debug!(connections = closed, "connections deregistered");

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for mut task in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "server task ended abnormally");
                }
                Err(_) => {
                    tracing::warn!("server task did not stop in time, aborting");
                    task.abort();
                }
            }
        }
        tracing::info!("MCP relay server stopped");
    }

    /// Resolves once the server has been told to stop.
    pub async fn wait(&self) {
        let mut rx = self.shutdown.subscribe();
        // `subscribe` marks the current value as seen; check it first.
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Serves until `signal` completes, then stops.
    pub async fn run_until<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {}
            _ = self.wait() => {}
        }
        self.stop().await;
    }
}

impl<C: Codec> Drop for RelayServer<C> {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Resolves once shutdown has been requested or the server handle is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Accepts connections until shutdown. Owns the listener, so returning
/// closes the listening socket.
async fn accept_loop<C: Codec>(
    mut transport: TcpTransport,
    state: Arc<ServerState<C>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            accepted = transport.accept() => accepted,
        };
        match accepted {
            Ok(conn) => spawn_connection(Arc::new(conn), &state, &shutdown).await,
            Err(e) => tracing::error!(error = %e, "error accepting client connection"),
        }
    }

    if let Err(e) = transport.shutdown().await {
        tracing::debug!(error = %e, "transport shutdown failed");
    }
    tracing::debug!("accept loop stopped");
}

/// Registers `conn` and spawns its task. The task runs the reader and
/// the writer until either ends, the peer is evicted, or the server
/// stops; then it deregisters the connection and closes it.
async fn spawn_connection<C: Codec>(
    conn: Arc<TcpConnection>,
    state: &Arc<ServerState<C>>,
    shutdown: &watch::Receiver<bool>,
) {
    let conn_id = conn.id();
    let origin = conn.peer_addr();

    let (peer, outbound) = Peer::new(conn_id, state.config.outbound_queue_len);
    if !state.registry.insert(peer.clone()).await {
        tracing::debug!(%conn_id, %origin, "server stopping, refusing connection");
        let _ = conn.close().await;
        return;
    }
    tracing::info!(%conn_id, %origin, "new client connected");

    let state = Arc::clone(state);
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let write_timeout = state.config.write_timeout;
        let result = tokio::select! {
            result = handle_connection(&conn, &peer, &state, shutdown) => result,
            result = write_loop(&conn, outbound, write_timeout) => result,
            _ = peer.evicted() => Err(RelayError::from(TransportError::OutboundFull {
                capacity: state.config.outbound_queue_len,
            })),
        };
        match result {
            Ok(reason) => {
                tracing::info!(%conn_id, %origin, ?reason, "client disconnected");
            }
            Err(e) => {
                tracing::warn!(%conn_id, %origin, error = %e, "client connection ended with error");
            }
        }
        state.registry.remove(conn_id).await;
        // The writer is gone, so nothing else holds the write half.
        let _ = conn.close().await;
    });
}
