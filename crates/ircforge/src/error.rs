//! Unified error type for the ircforge server.

use ircforge_channel::ChannelError;
use ircforge_protocol::ProtocolError;
use ircforge_session::SessionError;
use ircforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapped variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum IrcforgeError {
    /// A transport-level error (bind, send, unknown session).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (missing or invalid parameter).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unknown session, nickname taken).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A channel-level error (gated join, missing privileges).
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The transport manager's inbound queue already has a consumer.
    #[error("inbound queue already taken by another dispatcher")]
    InboundTaken,

    /// A command listener panicked.
    #[error("listener for {code} panicked: {message}")]
    ListenerPanicked { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use ircforge_transport::SessionId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let ircforge_err: IrcforgeError = err.into();
        assert!(matches!(ircforge_err, IrcforgeError::Transport(_)));
        assert!(ircforge_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::EmptyLine;
        let ircforge_err: IrcforgeError = err.into();
        assert!(matches!(ircforge_err, IrcforgeError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NotFound(SessionId::new("s1"));
        let ircforge_err: IrcforgeError = err.into();
        assert!(matches!(ircforge_err, IrcforgeError::Session(_)));
        assert!(ircforge_err.to_string().contains("s1"));
    }

    #[test]
    fn test_from_channel_error() {
        let err = ChannelError::NoSuchChannel("#gone".into());
        let ircforge_err: IrcforgeError = err.into();
        assert!(matches!(ircforge_err, IrcforgeError::Channel(_)));
    }
}
