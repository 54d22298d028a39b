//! Error types for the session layer.

use ircforge_transport::SessionId;

/// Errors that can occur during session management.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the given id. Either the connection was never
    /// announced or it already went away.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// A session with this id is already live.
    #[error("session {0} already connected")]
    AlreadyConnected(SessionId),

    /// Another session holds this nickname (compared case-insensitively).
    #[error("nickname {0} is already in use")]
    NickInUse(String),

    /// The nickname breaks the syntax rules of
    /// [`is_valid_nickname`](crate::is_valid_nickname).
    #[error("erroneous nickname {0}")]
    InvalidNick(String),
}
