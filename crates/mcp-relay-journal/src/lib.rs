//! Append-only journals for the MCP relay.
//!
//! The relay keeps three machine-readable logs, each one JSON object per
//! line:
//!
//! | file | writer | record |
//! |---|---|---|
//! | `chat_history.log` | server | [`ChatRecord`] |
//! | `system.log` | server | [`SystemRecord`] |
//! | `client_messages.log` | client | [`ClientRecord`] |
//!
//! These are separate from the operational `tracing` output. A
//! [`Journal`] is anything that can append a line; [`FileJournal`],
//! [`MemoryJournal`] and [`NullJournal`] cover files, tests, and
//! "don't record".

mod error;
mod journal;
mod records;

pub use error::JournalError;
pub use journal::{FileJournal, Journal, MemoryJournal, NullJournal};
pub use records::{
    ChatLabel, ChatRecord, ClientRecord, Direction, SystemRecord,
    CHAT_LOG_FILE, CLIENT_LOG_FILE, SYSTEM_LOG_FILE,
};
