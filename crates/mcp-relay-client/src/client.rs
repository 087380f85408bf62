//! The relay client: connection lifecycle, sending, and the receive task.
//!
//! A connected client runs two paths at once: the caller issuing `send*`
//! calls (writes), and one background receive task (reads). Each
//! direction of the socket is only ever driven by one of them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mcp_relay_journal::{
    ClientRecord, Direction, FileJournal, Journal, NullJournal,
    CLIENT_LOG_FILE,
};
use mcp_relay_protocol::{
    timestamp, Codec, JsonCodec, Message, MessageBody, MessageKind, ServerFrame,
    DEFAULT_HOST, DEFAULT_PORT,
};
use mcp_relay_transport::{Connection, TcpConnection, DEFAULT_MAX_FRAME_LEN};
use tokio::sync::{mpsc, watch};

use crate::handlers::HandlerRegistry;
use crate::{ClientError, HandlerError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where and how a [`RelayClient`] connects.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// How long `connect` waits before giving up.
    pub connect_timeout: Duration,
    /// Largest frame accepted from the server, in bytes.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ClientConfig {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`RelayClient`].
///
/// ```rust,no_run
/// use mcp_relay_client::RelayClient;
///
/// # async fn demo() -> Result<(), mcp_relay_client::ClientError> {
/// let client = RelayClient::builder()
///     .host("localhost")
///     .port(5555)
///     .log_dir("logs")
///     .build()?;
/// client.connect().await?;
/// client.send_chat("hello", true).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RelayClientBuilder {
    config: ClientConfig,
    message_log: Option<Arc<dyn Journal>>,
    log_dir: Option<PathBuf>,
}

impl RelayClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.config.max_frame_len = max_frame_len;
        self
    }

    /// Records chat traffic to `client_messages.log` under `dir`.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Records chat traffic to `journal`. Takes precedence over
    /// [`log_dir`](Self::log_dir).
    pub fn message_log(mut self, journal: Arc<dyn Journal>) -> Self {
        self.message_log = Some(journal);
        self
    }

    /// Builds a disconnected client.
    ///
    /// # Errors
    /// `ClientError::Journal` if the message log cannot be opened.
    pub fn build(self) -> Result<RelayClient, ClientError> {
        let journal: Arc<dyn Journal> = match (self.message_log, self.log_dir) {
            (Some(journal), _) => journal,
            (None, Some(dir)) => Arc::new(FileJournal::in_dir(dir, CLIENT_LOG_FILE)?),
            (None, None) => Arc::new(NullJournal),
        };
        Ok(RelayClient::with_journal(self.config, journal))
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where a client is in its connection lifecycle.
///
/// ```text
/// Disconnected → Connecting → Connected → Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

// ---------------------------------------------------------------------------
// RelayClient
// ---------------------------------------------------------------------------

/// A client of the relay server.
///
/// Incoming messages go to the handler registered for their kind, or to
/// a pull queue read with [`next_message`](Self::next_message) when
/// there is none. Dropping the client stops its receive task.
pub struct RelayClient {
    inner: Arc<ClientInner>,
}

/// One live connection and the signal that stops its receive task.
struct Session {
    conn: Arc<TcpConnection>,
    shutdown: watch::Sender<bool>,
}

struct ClientInner {
    config: ClientConfig,
    state: AtomicU8,
    session: Mutex<Option<Session>>,
    handlers: HandlerRegistry,
    queue_tx: mpsc::UnboundedSender<Message>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    journal: Arc<dyn Journal>,
    codec: JsonCodec,
}

impl RelayClient {
    /// Creates a builder.
    pub fn builder() -> RelayClientBuilder {
        RelayClientBuilder::new()
    }

    /// Creates a disconnected client that keeps no message log.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_journal(config, Arc::new(NullJournal))
    }

    /// Creates a client for `host:port` and connects it.
    ///
    /// # Errors
    /// `ClientError::Transport` if the server cannot be reached.
    pub async fn connect_to(host: &str, port: u16) -> Result<Self, ClientError> {
        let client = Self::builder().host(host).port(port).build()?;
        client.connect().await?;
        Ok(client)
    }

    fn with_journal(config: ClientConfig, journal: Arc<dyn Journal>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                session: Mutex::new(None),
                handlers: HandlerRegistry::new(),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                journal,
                codec: JsonCodec,
            }),
        }
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connects to the configured server and starts the receive task.
    ///
    /// Not retried. On failure the client is left exactly as it was.
    ///
    /// # Errors
    /// `ClientError::AlreadyConnected` if connecting or connected;
    /// `ClientError::Transport` if the server cannot be reached in time.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        if inner
            .state
            .compare_exchange(
                ConnectionState::Disconnected as u8,
                ConnectionState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ClientError::AlreadyConnected);
        }

        let addr = inner.config.addr();
        let conn = match TcpConnection::connect(&addr, inner.config.connect_timeout).await {
            Ok(conn) => Arc::new(conn.with_max_frame_len(inner.config.max_frame_len)),
            Err(e) => {
                inner.set_state(ConnectionState::Disconnected);
                tracing::error!(%addr, error = %e, "connection error");
                return Err(e.into());
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        {
            let mut session = inner.lock_session();
            *session = Some(Session {
                conn: Arc::clone(&conn),
                shutdown: shutdown_tx,
            });
            inner.set_state(ConnectionState::Connected);
        }
        tokio::spawn(receive_loop(Arc::clone(inner), conn, shutdown_rx));

        tracing::info!(%addr, "connected to MCP server");
        Ok(())
    }

    /// Disconnects and stops the receive task. Calling it again, or on a
    /// client that never connected, does nothing.
    pub async fn disconnect(&self) {
        if let Some(session) = self.inner.take_session(None) {
            session.close().await;
            tracing::info!("disconnected from MCP server");
        }
    }

    /// Sends one message of the given kind.
    ///
    /// A write failure disconnects the client; nothing is retried.
    ///
    /// # Errors
    /// `ClientError::NotConnected` when not connected, or the transport
    /// error that ended the connection.
    pub async fn send(
        &self,
        body: MessageBody,
        content: impl Into<String>,
    ) -> Result<(), ClientError> {
        let conn = self.inner.current_conn().ok_or(ClientError::NotConnected)?;
        let message = Message::new(body, content);
        let frame = self.inner.codec.encode(&message)?;

        if let Err(e) = conn.send(&frame).await {
            tracing::error!(error = %e, "error sending message");
            if let Some(session) = self.inner.take_session(Some(&conn)) {
                session.close().await;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Sends a chat message.
    ///
    /// The outgoing record is written to the message log before the
    /// network write, so a failed write still leaves it in the log.
    ///
    /// # Errors
    /// As [`send`](Self::send).
    pub async fn send_chat(
        &self,
        content: impl Into<String>,
        is_user: bool,
    ) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let content = content.into();
        self.inner.record(ClientRecord {
            timestamp: timestamp::now(),
            direction: Direction::Outgoing,
            kind: MessageKind::Chat.as_str().to_string(),
            sender: ClientRecord::outgoing_sender(is_user).to_string(),
            content: content.clone(),
        });
        self.send(MessageBody::Chat { is_user: Some(is_user) }, content)
            .await
    }

    /// Sends a system message with an optional command.
    ///
    /// # Errors
    /// As [`send`](Self::send).
    pub async fn send_system(
        &self,
        content: impl Into<String>,
        command: Option<&str>,
    ) -> Result<(), ClientError> {
        let command = command.map(str::to_string);
        self.send(MessageBody::System { command }, content).await
    }

    /// Routes future messages of `kind` to `handler` instead of the pull
    /// queue, replacing any handler already registered for `kind`.
    ///
    /// The handler runs on the receive task; while it runs no further
    /// messages are read, so it must not block for long.
    pub fn register_handler<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        if self.inner.handlers.register(kind, handler) {
            tracing::debug!(%kind, "replaced message handler");
        }
    }

    /// Removes the handler for `kind`; its messages go to the pull queue
    /// again. Returns whether one was registered.
    pub fn unregister_handler(&self, kind: MessageKind) -> bool {
        self.inner.handlers.unregister(kind)
    }

    /// Waits for the next message that had no handler.
    ///
    /// With `Some(timeout)`, returns `None` if nothing arrives in time;
    /// with `None`, waits indefinitely.
    pub async fn next_message(&self, timeout: Option<Duration>) -> Option<Message> {
        let mut queue = self.inner.queue_rx.lock().await;
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, queue.recv())
                .await
                .ok()
                .flatten(),
            None => queue.recv().await,
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(session) = self.inner.take_session(None) {
            session.shutdown.send_replace(true);
        }
    }
}

impl Session {
    async fn close(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.conn.close().await {
            tracing::debug!(error = %e, "error closing connection");
        }
    }
}

impl ClientInner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_conn(&self) -> Option<Arc<TcpConnection>> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.lock_session()
            .as_ref()
            .map(|session| Arc::clone(&session.conn))
    }

    /// Takes the live session, marking the client disconnected.
    ///
    /// With `Some(conn)`, only takes it if it is still that connection; a
    /// receive task or failed send must not tear down a newer session.
    fn take_session(&self, only: Option<&Arc<TcpConnection>>) -> Option<Session> {
        let mut slot = self.lock_session();
        if let (Some(conn), Some(session)) = (only, slot.as_ref()) {
            if !Arc::ptr_eq(conn, &session.conn) {
                return None;
            }
        }
        let session = slot.take()?;
        self.set_state(ConnectionState::Disconnected);
        Some(session)
    }

    fn record(&self, record: ClientRecord) {
        if let Err(e) = self.journal.append(&record) {
            tracing::error!(error = %e, "failed to append client record");
        }
    }

    /// Records incoming chat, then hands the message to its handler or
    /// the pull queue.
    fn handle_message(&self, message: Message) {
        if message.kind() == Some(MessageKind::Chat) {
            self.record(ClientRecord {
                timestamp: timestamp::now(),
                direction: Direction::Incoming,
                kind: MessageKind::Chat.as_str().to_string(),
                sender: message
                    .sender
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                content: message.content.clone(),
            });
        }

        if let Some(message) = self.handlers.dispatch(message) {
            // The receiver lives as long as `self`, so this cannot fail.
            let _ = self.queue_tx.send(message);
        }
    }
}

// ---------------------------------------------------------------------------
// Receive task
// ---------------------------------------------------------------------------

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Reads frames until shutdown, end of stream, or a transport error.
async fn receive_loop(
    inner: Arc<ClientInner>,
    conn: Arc<TcpConnection>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(conn_id = %conn.id(), "receive task started");
    loop {
        let frame = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            frame = conn.recv() => frame,
        };

        match frame {
            Ok(Some(data)) => match inner.codec.decode::<ServerFrame>(&data) {
                Ok(ServerFrame::Ack(ack)) => {
                    tracing::debug!(timestamp = %ack.timestamp, "server acknowledged message");
                }
                Ok(ServerFrame::Message(message)) => {
                    tracing::debug!(kind = ?message.kind(), "received message");
                    inner.handle_message(message);
                }
                Err(e) => {
                    tracing::error!(error = %e, "invalid message received");
                }
            },
            Ok(None) => {
                tracing::info!("server closed the connection");
                break;
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "dropped oversized frame");
            }
            Err(e) => {
                tracing::error!(error = %e, "error receiving message");
                break;
            }
        }
    }

    if let Some(session) = inner.take_session(Some(&conn)) {
        session.close().await;
    }
    tracing::debug!(conn_id = %conn.id(), "receive task stopped");
}
