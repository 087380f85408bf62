//! Types that travel on the wire between relay clients and the server.
//!
//! Every frame is one JSON object. Clients send [`Message`]s; the server
//! answers each accepted message with an [`Ack`] and pushes broadcast
//! [`Message`]s to every connection. A client therefore reads a mix of
//! both, which [`ServerFrame`] tells apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timestamp;

/// Host the relay listens on and clients connect to by default.
pub const DEFAULT_HOST: &str = "localhost";

/// TCP port the relay listens on and clients connect to by default.
pub const DEFAULT_PORT: u16 = 5555;

/// The only system `command` the server acts on.
pub const BROADCAST_COMMAND: &str = "broadcast";

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The recognised message kinds.
///
/// Used as the key of the client's handler slots. A [`MessageBody`] that
/// carries an unrecognised `type` has no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Human or assistant chat traffic.
    Chat,
    /// Control traffic, optionally carrying a command.
    System,
}

impl MessageKind {
    /// The wire spelling of this kind (`"chat"` / `"system"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MessageBody
// ---------------------------------------------------------------------------

/// The kind-specific part of a [`Message`], tagged by the `type` field.
///
/// Flattened into the message, so on the wire this is just `"type"`
/// plus the kind's own fields:
///
/// ```json
/// {"type": "chat", "is_user": true, ...}
/// {"type": "system", "command": "broadcast", ...}
/// ```
///
/// Any other `type` string decodes to [`MessageBody::Unknown`] rather
/// than failing, so the server can log and drop it. A payload with no
/// `type` at all is a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// A chat message.
    Chat {
        /// `true` for human-originated, `false` for assistant-originated.
        /// Server broadcasts omit it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_user: Option<bool>,
    },

    /// A system message.
    System {
        /// Optional command. Only `"broadcast"` has behaviour.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },

    /// A `type` this relay does not recognise.
    #[serde(other)]
    Unknown,
}

impl MessageBody {
    /// Returns the recognised kind, or `None` for [`MessageBody::Unknown`].
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Self::Chat { .. } => Some(MessageKind::Chat),
            Self::System { .. } => Some(MessageKind::System),
            Self::Unknown => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// The unit exchanged on the socket and recorded in the journals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// `type` plus the kind-specific fields.
    #[serde(flatten)]
    pub body: MessageBody,

    /// Text payload. Opaque to the relay.
    #[serde(default)]
    pub content: String,

    /// ISO-8601 time. Set by the sender, overwritten by the server on
    /// receipt.
    #[serde(default)]
    pub timestamp: String,

    /// Address of the connection the server received this message from.
    /// Only the server sets it; clients never do.
    #[serde(
        rename = "client_address",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub origin: Option<String>,

    /// Origin address attached by the server to chat broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(body: MessageBody, content: impl Into<String>) -> Self {
        Self {
            body,
            content: content.into(),
            timestamp: timestamp::now(),
            origin: None,
            sender: None,
        }
    }

    /// Creates a chat message.
    pub fn chat(content: impl Into<String>, is_user: bool) -> Self {
        Self::new(
            MessageBody::Chat {
                is_user: Some(is_user),
            },
            content,
        )
    }

    /// Creates a system message with an optional command.
    pub fn system(content: impl Into<String>, command: Option<String>) -> Self {
        Self::new(MessageBody::System { command }, content)
    }

    /// The chat message the server fans out after receiving a chat from
    /// `sender`: `{type: "chat", sender, content, timestamp}`.
    pub fn chat_broadcast(
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            body: MessageBody::Chat { is_user: None },
            content: content.into(),
            timestamp: timestamp.into(),
            origin: None,
            sender: Some(sender.into()),
        }
    }

    /// Returns the recognised kind, or `None` for an unknown `type`.
    pub fn kind(&self) -> Option<MessageKind> {
        self.body.kind()
    }

    /// Whether a chat message is human-originated. Missing or `null`
    /// means `true`. Always `false` for non-chat messages.
    pub fn is_user(&self) -> bool {
        match &self.body {
            MessageBody::Chat { is_user } => is_user.unwrap_or(true),
            _ => false,
        }
    }

    /// The system command, if any.
    pub fn command(&self) -> Option<&str> {
        match &self.body {
            MessageBody::System { command } => command.as_deref(),
            _ => None,
        }
    }

    /// Whether this is a system message asking to be broadcast.
    pub fn is_broadcast_command(&self) -> bool {
        self.command() == Some(BROADCAST_COMMAND)
    }
}

// ---------------------------------------------------------------------------
// Ack
// ---------------------------------------------------------------------------

/// Status carried by an [`Ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// The server parsed the message and queued it for dispatch.
    Received,
}

/// The server's synchronous reply to every accepted inbound message:
/// `{"status": "received", "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Always [`AckStatus::Received`].
    pub status: AckStatus,
    /// Server receipt time.
    pub timestamp: String,
}

impl Ack {
    /// A `received` acknowledgment stamped with the current time.
    pub fn received() -> Self {
        Self {
            status: AckStatus::Received,
            timestamp: timestamp::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerFrame
// ---------------------------------------------------------------------------

/// Anything a client can read from the server.
///
/// Untagged: a frame with a `status` field is an [`Ack`], anything with a
/// `type` field is a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Acknowledgment of one of this client's own messages.
    Ack(Ack),
    /// A relayed message.
    Message(Message),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_json_shape() {
        let msg = Message::chat("hello", true);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "chat");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["is_user"], true);
        assert!(json["timestamp"].is_string());
        // Clients never set the origin.
        assert!(json.get("client_address").is_none());
        assert!(json.get("command").is_none());
    }

    #[test]
    fn test_system_json_shape() {
        let msg = Message::system("reload config", Some("broadcast".into()));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "system");
        assert_eq!(json["command"], "broadcast");
        assert!(json.get("is_user").is_none());
        assert!(msg.is_broadcast_command());
    }

    #[test]
    fn test_chat_broadcast_carries_sender_not_origin() {
        let msg = Message::chat_broadcast("127.0.0.1:4000", "hi", "t0");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["sender"], "127.0.0.1:4000");
        assert_eq!(json["timestamp"], "t0");
        assert!(json.get("is_user").is_none());
        assert!(json.get("client_address").is_none());
    }

    #[test]
    fn test_origin_round_trips_as_client_address() {
        let json = r#"{"type":"chat","content":"x","timestamp":"t",
                       "client_address":"10.0.0.1:9999"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.origin.as_deref(), Some("10.0.0.1:9999"));
    }

    #[test]
    fn test_missing_is_user_defaults_to_user() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"chat","content":"x"}"#).unwrap();
        assert_eq!(msg.kind(), Some(MessageKind::Chat));
        assert!(msg.is_user());
        assert_eq!(msg.timestamp, "");
    }

    #[test]
    fn test_null_is_user_counts_as_user() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"chat","content":"x","is_user":null}"#,
        )
        .unwrap();
        assert!(msg.is_user());

        let msg: Message = serde_json::from_str(
            r#"{"type":"chat","content":"x","is_user":false}"#,
        )
        .unwrap();
        assert!(!msg.is_user());
    }

    #[test]
    fn test_unknown_type_decodes_as_unknown() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"weather","content":"sunny"}"#)
                .unwrap();
        assert_eq!(msg.body, MessageBody::Unknown);
        assert_eq!(msg.kind(), None);
        assert_eq!(msg.content, "sunny");
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let result: Result<Message, _> =
            serde_json::from_str(r#"{"content":"no type"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"system","content":"c","command":null,"priority":3}"#,
        )
        .unwrap();
        assert_eq!(msg.command(), None);
        assert_eq!(msg.kind(), Some(MessageKind::System));
    }

    #[test]
    fn test_server_frame_distinguishes_ack_from_message() {
        let ack: ServerFrame = serde_json::from_str(
            r#"{"status":"received","timestamp":"t"}"#,
        )
        .unwrap();
        assert!(matches!(ack, ServerFrame::Ack(_)));

        let msg: ServerFrame = serde_json::from_str(
            r#"{"type":"chat","sender":"a","content":"hi","timestamp":"t"}"#,
        )
        .unwrap();
        match msg {
            ServerFrame::Message(m) => {
                assert_eq!(m.sender.as_deref(), Some("a"));
                assert_eq!(m.content, "hi");
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_server_frame_rejects_neither() {
        let result: Result<ServerFrame, _> =
            serde_json::from_str(r#"{"hello":"world"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_display_matches_wire() {
        assert_eq!(MessageKind::Chat.to_string(), "chat");
        assert_eq!(MessageKind::System.to_string(), "system");
    }
}
