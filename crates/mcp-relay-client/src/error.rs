//! Client error types.

use mcp_relay_journal::JournalError;
use mcp_relay_protocol::ProtocolError;
use mcp_relay_transport::TransportError;

/// What a message handler returns when it fails.
///
/// The failure is logged and isolated to that one message; the receive
/// task keeps running.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`RelayClient`](crate::RelayClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A send was attempted while not connected.
    #[error("not connected to the relay server")]
    NotConnected,

    /// `connect` was called on a client that is connecting or connected.
    #[error("already connected to the relay server")]
    AlreadyConnected,

    /// Connecting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The message journal could not be opened.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl ClientError {
    /// Whether this is the client failing to reach the server.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(
                TransportError::ConnectFailed { .. }
                    | TransportError::ConnectTimeout { .. }
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_connect_errors_are_detected() {
        let refused: ClientError = TransportError::ConnectFailed {
            addr: "localhost:5555".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        }
        .into();
        assert!(refused.is_connect_error());

        let slow: ClientError = TransportError::ConnectTimeout {
            addr: "localhost:5555".into(),
            timeout: Duration::from_secs(5),
        }
        .into();
        assert!(slow.is_connect_error());

        assert!(!ClientError::NotConnected.is_connect_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ClientError::NotConnected.to_string(),
            "not connected to the relay server"
        );
    }
}
