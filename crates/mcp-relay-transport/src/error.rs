use std::time::Duration;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening address could not be acquired.
    #[error("bind to {addr} failed: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The remote relay could not be reached.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote relay did not answer within the connect timeout.
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The peer sent nothing for longer than the idle timeout.
    #[error("connection idle for more than {0:?}")]
    IdleTimeout(Duration),

    /// A write did not complete within the write timeout; the peer has
    /// stopped reading.
    #[error("write stalled for more than {0:?}")]
    WriteTimeout(Duration),

    /// The per-connection outbound queue is full; the peer is not keeping
    /// up with what is sent to it.
    #[error("outbound queue full ({capacity} frames)")]
    OutboundFull { capacity: usize },

    /// A single frame exceeded the maximum frame length. The oversized
    /// frame has already been skipped, so the stream is still usable.
    #[error("frame exceeds {max} bytes and was discarded")]
    FrameTooLarge { max: usize },

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Returns `true` when the connection can keep reading after this error.
    ///
    /// Only framing violations are recoverable; every I/O failure ends
    /// the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_frame_errors_are_recoverable() {
        assert!(TransportError::FrameTooLarge { max: 8 }.is_recoverable());
        assert!(!TransportError::Shutdown.is_recoverable());
        assert!(
            !TransportError::IdleTimeout(Duration::from_secs(1))
                .is_recoverable()
        );
        assert!(
            !TransportError::WriteTimeout(Duration::from_secs(1))
                .is_recoverable()
        );
        assert!(
            !TransportError::OutboundFull { capacity: 4 }.is_recoverable()
        );
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "x");
        assert!(!TransportError::SendFailed(io).is_recoverable());
    }

    #[test]
    fn test_bind_failed_mentions_address() {
        let err = TransportError::BindFailed {
            addr: "localhost:5555".into(),
            source: std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "in use",
            ),
        };
        assert!(err.to_string().contains("localhost:5555"));
    }
}
