//! # MCP relay
//!
//! A small message relay: clients connect over TCP and send chat or
//! system messages; the server acknowledges each one, records it in an
//! append-only journal, and fans it out to every connected client.
//!
//! ```text
//! client ─send─▶ receive task ─▶ inbound queue ─▶ dispatcher ─┬─▶ journal
//!                 (per conn)       (FIFO)        (single)     │
//!                                                             └─▶ broadcast
//!                                                                 │
//!   all clients ◀─ writer task ◀─ outbound queue (per conn)   ◀───┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_relay::prelude::*;
//!
//! # async fn demo() -> Result<(), RelayError> {
//! let server = RelayServer::builder()
//!     .bind("localhost:5555")
//!     .log_dir("logs")
//!     .start()
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod error;
mod handler;
mod registry;
mod server;
pub mod telemetry;

pub use error::RelayError;
pub use server::{RelayServer, RelayServerBuilder, ServerConfig};

/// Everything needed to run a server and inspect its journals.
pub mod prelude {
    pub use crate::{RelayError, RelayServer, RelayServerBuilder, ServerConfig};
    pub use mcp_relay_journal::{
        ChatLabel, ChatRecord, FileJournal, Journal, MemoryJournal,
        NullJournal, SystemRecord,
    };
    pub use mcp_relay_protocol::{
        Ack, Message, MessageBody, MessageKind, ServerFrame, DEFAULT_HOST,
        DEFAULT_PORT,
    };
}
