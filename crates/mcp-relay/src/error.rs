//! Unified error type for the relay server.

use mcp_relay_journal::JournalError;
use mcp_relay_protocol::ProtocolError;
use mcp_relay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A journal could not be opened or written.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl RelayError {
    /// Whether this is the server failing to acquire its listening address.
    pub fn is_bind_error(&self) -> bool {
        matches!(self, Self::Transport(TransportError::BindFailed { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::Transport(_)));
        assert!(relay_err.to_string().contains("gone"));
        assert!(!relay_err.is_bind_error());
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::Protocol(_)));
    }

    #[test]
    fn test_from_journal_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro");
        let relay_err: RelayError = JournalError::Io(io).into();
        assert!(matches!(relay_err, RelayError::Journal(_)));
    }

    #[test]
    fn test_bind_error_detection() {
        let err: RelayError = TransportError::BindFailed {
            addr: "localhost:5555".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy"),
        }
        .into();
        assert!(err.is_bind_error());
    }
}
