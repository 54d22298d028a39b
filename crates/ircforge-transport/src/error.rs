use crate::SessionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A transport with the same name and port is already registered.
    #[error("transport {name} on port {port} is already registered")]
    DuplicateTransport { name: String, port: u16 },

    /// No transport owns the given session.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The transport (or the manager's queues) was shut down.
    #[error("transport shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failure() {
        let io = || std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(TransportError::SendFailed(io()).to_string(), "send failed: pipe");
        assert_eq!(TransportError::AcceptFailed(io()).to_string(), "accept failed: pipe");
        assert_eq!(
            TransportError::DuplicateTransport { name: "plain".into(), port: 6667 }.to_string(),
            "transport plain on port 6667 is already registered"
        );
        assert_eq!(
            TransportError::UnknownSession(SessionId::new("s9")).to_string(),
            "unknown session s9"
        );
    }

    #[test]
    fn test_send_failed_keeps_io_source() {
        use std::error::Error;
        let err = TransportError::SendFailed(std::io::Error::other("reset"));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("reset"));
    }
}
