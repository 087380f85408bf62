//! The structured records written to each journal, one JSON object per
//! line.

use serde::{Deserialize, Serialize};

/// Journal of chat messages seen by the server.
pub const CHAT_LOG_FILE: &str = "chat_history.log";
/// Journal of system messages seen by the server.
pub const SYSTEM_LOG_FILE: &str = "system.log";
/// Journal of chat traffic seen by one client.
pub const CLIENT_LOG_FILE: &str = "client_messages.log";

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatLabel {
    /// Typed by a human.
    UserMessage,
    /// Produced by the assistant.
    AiResponse,
}

impl ChatLabel {
    /// Maps the wire `is_user` flag to a label.
    pub fn from_is_user(is_user: bool) -> Self {
        if is_user {
            Self::UserMessage
        } else {
            Self::AiResponse
        }
    }
}

/// One line of `chat_history.log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Server receipt time.
    pub timestamp: String,
    /// Origin connection address.
    pub client: String,
    /// Message text.
    pub content: String,
    /// Direction label.
    #[serde(rename = "type")]
    pub label: ChatLabel,
}

/// One line of `system.log`. `command` is written as `null` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRecord {
    /// Server receipt time.
    pub timestamp: String,
    /// Origin connection address.
    pub client: String,
    /// Message text.
    pub content: String,
    /// The system command, if any.
    pub command: Option<String>,
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Whether a client record was sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One line of `client_messages.log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Local time the record was made.
    pub timestamp: String,
    pub direction: Direction,
    /// Message kind as spelled on the wire.
    #[serde(rename = "type")]
    pub kind: String,
    /// `"user"` / `"assistant"` for outgoing records; the broadcast
    /// sender, or `"unknown"`, for incoming ones.
    pub sender: String,
    pub content: String,
}

impl ClientRecord {
    /// Sender label for an outgoing chat.
    pub fn outgoing_sender(is_user: bool) -> &'static str {
        if is_user { "user" } else { "assistant" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_record_json_shape() {
        let record = ChatRecord {
            timestamp: "t".into(),
            client: "127.0.0.1:4000".into(),
            content: "hello".into(),
            label: ChatLabel::from_is_user(true),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "user_message");
        assert_eq!(json["client"], "127.0.0.1:4000");

        let ai = ChatLabel::from_is_user(false);
        assert_eq!(serde_json::to_value(ai).unwrap(), "ai_response");
    }

    #[test]
    fn test_system_record_writes_null_command() {
        let record = SystemRecord {
            timestamp: "t".into(),
            client: "c".into(),
            content: "status".into(),
            command: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["command"].is_null());
        assert!(json.as_object().unwrap().contains_key("command"));
    }

    #[test]
    fn test_client_record_json_shape() {
        let record = ClientRecord {
            timestamp: "t".into(),
            direction: Direction::Outgoing,
            kind: "chat".into(),
            sender: ClientRecord::outgoing_sender(false).into(),
            content: "hi".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["direction"], "outgoing");
        assert_eq!(json["type"], "chat");
        assert_eq!(json["sender"], "assistant");
    }
}
