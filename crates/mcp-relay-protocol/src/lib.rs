//! Wire protocol for the MCP relay.
//!
//! This crate defines what clients and the relay server say to each
//! other:
//!
//! - **Types** ([`Message`], [`MessageBody`], [`Ack`], [`ServerFrame`]) —
//!   the JSON objects that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those objects are
//!   converted to and from one frame of bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong doing so.
//!
//! It knows nothing about sockets or logs.
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Server / Client
//! ```

mod codec;
mod error;
pub mod timestamp;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Ack, AckStatus, Message, MessageBody, MessageKind, ServerFrame,
    BROADCAST_COMMAND, DEFAULT_HOST, DEFAULT_PORT,
};
