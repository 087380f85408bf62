//! # MCP relay client
//!
//! Connects to an MCP relay server, sends chat and system messages, and
//! receives whatever the server broadcasts.
//!
//! Incoming messages are delivered one of two ways:
//!
//! - **Push**: [`RelayClient::register_handler`] installs a callback for a
//!   [`MessageKind`]; it runs on the receive task for each message of
//!   that kind.
//! - **Pull**: messages with no handler are queued, and
//!   [`RelayClient::next_message`] takes them off the queue.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use mcp_relay_client::{MessageKind, RelayClient};
//!
//! # async fn demo() -> Result<(), mcp_relay_client::ClientError> {
//! let client = RelayClient::connect_to("localhost", 5555).await?;
//! client.register_handler(MessageKind::System, |msg| {
//!     println!("system: {}", msg.content);
//!     Ok(())
//! });
//!
//! client.send_chat("hello", true).await?;
//! if let Some(echo) = client.next_message(Some(Duration::from_secs(5))).await {
//!     println!("relayed: {}", echo.content);
//! }
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod handlers;

pub use client::{ClientConfig, ConnectionState, RelayClient, RelayClientBuilder};
pub use error::{ClientError, HandlerError};
pub use mcp_relay_protocol::{Message, MessageBody, MessageKind};
